//! The external collaborators the session layer consumes.
//!
//! - [`IdentityProvider`]: sign-in, sign-out, session retrieval, password
//!   management and the lifecycle event stream.
//! - [`DirectoryStore`]: row-level reads and writes over profiles and role
//!   assignments. Writes are authorised by the provider itself and fail with
//!   [`Error::PermissionDenied`](crate::Error::PermissionDenied).
//! - [`SnapshotStorage`]: where the persisted identity snapshot lives across
//!   reloads.
//!
//! Implemented by backends (e.g. `aula-store-sqlite`); the session and web
//! crates depend on these abstractions only.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  event::{AuthEvent, AuthSession, SessionUser},
  principal::AccountStatus,
  role::Role,
  snapshot::PersistedSnapshot,
};

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub id:           Uuid,
  pub email:        String,
  pub display_name: Option<String>,
  pub status:       AccountStatus,
  pub created_at:   DateTime<Utc>,
}

/// A role-assignment row. The tag is stored verbatim; normalisation is the
/// reader's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
  pub principal_id: Uuid,
  pub role:         String,
  pub assigned_at:  DateTime<Utc>,
}

/// Input to [`DirectoryStore::create_profile`].
#[derive(Debug, Clone)]
pub struct NewProfile {
  pub email:        String,
  pub display_name: Option<String>,
  pub status:       AccountStatus,
}

// ─── Identity provider ───────────────────────────────────────────────────────

/// Abstraction over the authentication service.
///
/// Events are delivered at-least-once on a single logical stream; a
/// `SignedOut` event is authoritative.
pub trait IdentityProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  fn sign_in_with_password<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AuthSession, Self::Error>> + Send + 'a;

  fn sign_out(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The session currently held, if any.
  fn current_session(
    &self,
  ) -> impl Future<Output = Result<Option<AuthSession>, Self::Error>> + Send + '_;

  /// Start a password reset for `email`. Unknown addresses succeed silently.
  fn request_password_reset<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Change the signed-in principal's password.
  fn update_password<'a>(
    &'a self,
    new_password: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Self-service registration: credentials plus an active profile holding
  /// no roles. The new principal is not signed in.
  fn sign_up<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
    display_name: Option<&'a str>,
  ) -> impl Future<Output = Result<SessionUser, Self::Error>> + Send + 'a;

  /// Redeem a password-reset token, setting `new_password`. Returns the
  /// principal whose password changed.
  fn complete_password_reset<'a>(
    &'a self,
    token: &'a str,
    new_password: &'a str,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + 'a;

  /// A fresh receiver on the lifecycle event stream.
  fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

// ─── Data provider ───────────────────────────────────────────────────────────

/// Abstraction over the relational data store holding profiles and role
/// assignments.
///
/// Every write names the acting principal; the store rejects writes the
/// actor is not entitled to.
pub trait DirectoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn fetch_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  fn fetch_role_assignments(
    &self,
    principal_id: Uuid,
  ) -> impl Future<Output = Result<Vec<RoleAssignment>, Self::Error>> + Send + '_;

  /// Profiles holding `role`, optionally filtered by a case-insensitive
  /// substring of the name or email.
  fn list_by_role<'a>(
    &'a self,
    role: &'a Role,
    search: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<Profile>, Self::Error>> + Send + 'a;

  // ── Writes ────────────────────────────────────────────────────────────

  fn create_profile(
    &self,
    actor: Uuid,
    input: NewProfile,
  ) -> impl Future<Output = Result<Profile, Self::Error>> + Send + '_;

  /// Replace every role assignment of `principal_id` with `roles`.
  fn assign_roles<'a>(
    &'a self,
    actor: Uuid,
    principal_id: Uuid,
    roles: &'a [Role],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Add `role` unless already assigned.
  fn add_role<'a>(
    &'a self,
    actor: Uuid,
    principal_id: Uuid,
    role: &'a Role,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn remove_role<'a>(
    &'a self,
    actor: Uuid,
    principal_id: Uuid,
    role: &'a Role,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn set_status(
    &self,
    actor: Uuid,
    principal_id: Uuid,
    status: AccountStatus,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Flip between `dropped` and `active`; returns the new status.
  fn toggle_dropped(
    &self,
    actor: Uuid,
    principal_id: Uuid,
  ) -> impl Future<Output = Result<AccountStatus, Self::Error>> + Send + '_;
}

// ─── Snapshot storage ────────────────────────────────────────────────────────

/// Durable home of the [`PersistedSnapshot`].
pub trait SnapshotStorage: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  fn load(
    &self,
  ) -> impl Future<Output = Result<Option<PersistedSnapshot>, Self::Error>> + Send + '_;

  fn save<'a>(
    &'a self,
    snapshot: &'a PersistedSnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn clear(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
