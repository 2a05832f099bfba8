//! The authenticated principal and its account status.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::{Role, RoleSet};

/// Enrollment status of an account. Orthogonal to authentication: a
/// principal can hold a valid session and still be flagged `dropped`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccountStatus {
  #[default]
  Active,
  Inactive,
  /// The student abandoned their program.
  Dropped,
}

impl AccountStatus {
  /// Parse a stored status; missing or unrecognised values count as
  /// `active`.
  pub fn parse_lenient(raw: Option<&str>) -> Self {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or_default()
  }
}

/// An authenticated principal as held by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub id:           Uuid,
  pub email:        String,
  pub display_name: Option<String>,
  #[serde(default)]
  pub status:       AccountStatus,
  #[serde(default)]
  pub roles:        RoleSet,
}

impl Principal {
  pub fn primary_role(&self) -> Option<&Role> { self.roles.primary() }
}

/// Input to `SessionStore::set_user` in `aula-session`.
///
/// Carries the legacy single `role` field next to the role list so callers
/// holding the older shape can still hand it over unchanged.
#[derive(Debug, Clone)]
pub struct UserFields {
  pub id:           Uuid,
  pub email:        String,
  pub display_name: Option<String>,
  pub status:       AccountStatus,
  pub roles:        Vec<Role>,
  pub legacy_role:  Option<Role>,
}

impl UserFields {
  /// Convenience constructor with an empty role list and `active` status.
  pub fn new(id: Uuid, email: impl Into<String>) -> Self {
    Self {
      id,
      email: email.into(),
      display_name: None,
      status: AccountStatus::default(),
      roles: Vec::new(),
      legacy_role: None,
    }
  }

  pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
    self.roles = roles.into_iter().collect();
    self
  }

  pub fn into_principal(self) -> Principal {
    Principal {
      id:           self.id,
      email:        self.email,
      display_name: self.display_name,
      status:       self.status,
      roles:        RoleSet::with_legacy(self.roles, self.legacy_role),
    }
  }
}
