//! Error types for `aula-core`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// An outbound call to the identity or data provider did not settle in
  /// time. The underlying request has been dropped.
  #[error("{operation} timed out after {after:?}")]
  Timeout {
    operation: &'static str,
    after:     Duration,
  },

  /// The data provider refused the operation for the acting principal.
  /// Retrying cannot succeed.
  #[error("permission denied: {0}")]
  PermissionDenied(String),

  #[error("not found: {0}")]
  NotFound(String),

  /// The write collides with existing data, e.g. an email already in use.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("invalid credentials")]
  InvalidCredentials,

  #[error("no active session")]
  NoSession,

  #[error("invalid role tag: {0:?}")]
  InvalidRole(String),

  #[error("backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether the failure is worth retrying on the next focus or navigation.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Timeout { .. } | Self::Backend(_))
  }

  pub fn is_permission_denied(&self) -> bool {
    matches!(self, Self::PermissionDenied(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
