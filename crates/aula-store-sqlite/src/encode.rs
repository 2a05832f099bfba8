//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings.

use aula_core::{
  principal::AccountStatus,
  provider::{Profile, RoleAssignment},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── AccountStatus ───────────────────────────────────────────────────────────

pub fn encode_status(status: AccountStatus) -> &'static str { status.into() }

/// Rows written by older tooling may carry blank or unknown statuses; those
/// read as `active`.
pub fn decode_status(s: Option<&str>) -> AccountStatus { AccountStatus::parse_lenient(s) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PROFILE_COLUMNS: &str = "id, email, display_name, status, created_at";

/// Raw strings read directly from a `profiles` row.
pub struct RawProfile {
  pub id:           String,
  pub email:        String,
  pub display_name: Option<String>,
  pub status:       Option<String>,
  pub created_at:   String,
}

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      email:        row.get(1)?,
      display_name: row.get(2)?,
      status:       row.get(3)?,
      created_at:   row.get(4)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      id:           decode_uuid(&self.id)?,
      email:        self.email,
      display_name: self.display_name.filter(|n| !n.trim().is_empty()),
      status:       decode_status(self.status.as_deref()),
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `role_assignments` row.
pub struct RawRoleAssignment {
  pub principal_id: String,
  pub role:         String,
  pub assigned_at:  String,
}

impl RawRoleAssignment {
  pub fn into_assignment(self) -> Result<RoleAssignment> {
    Ok(RoleAssignment {
      principal_id: decode_uuid(&self.principal_id)?,
      role:         self.role,
      assigned_at:  decode_dt(&self.assigned_at)?,
    })
  }
}
