//! Error type for `aula-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] aula_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("password hashing failed: {0}")]
  PasswordHash(String),

  /// The acting principal does not hold `admin`.
  #[error("{actor} may not {action}")]
  PermissionDenied {
    actor:  Uuid,
    action: &'static str,
  },

  #[error("principal not found: {0}")]
  PrincipalNotFound(Uuid),

  #[error("email already registered: {0}")]
  EmailTaken(String),

  #[error("invalid credentials")]
  InvalidCredentials,

  #[error("no active session")]
  NoSession,

  /// Unknown, expired or already used.
  #[error("invalid password reset token")]
  InvalidResetToken,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for aula_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      Error::Json(inner) => Self::Serialization(inner),
      e @ Error::PermissionDenied { .. } => Self::PermissionDenied(e.to_string()),
      Error::PrincipalNotFound(id) => Self::NotFound(id.to_string()),
      Error::InvalidCredentials | Error::InvalidResetToken => Self::InvalidCredentials,
      Error::NoSession => Self::NoSession,
      e @ Error::EmailTaken(_) => Self::Conflict(e.to_string()),
      other => Self::Backend(Box::new(other)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn permission_denied_survives_conversion() {
    let e: aula_core::Error = Error::PermissionDenied {
      actor:  Uuid::nil(),
      action: "assign roles",
    }
    .into();
    assert!(e.is_permission_denied());
    assert!(!e.is_transient());
  }

  #[test]
  fn taken_email_is_a_conflict() {
    let e: aula_core::Error = Error::EmailTaken("ana@example.edu".into()).into();
    assert!(matches!(e, aula_core::Error::Conflict(ref msg) if msg.contains("ana@example.edu")));
    assert!(!e.is_transient());
  }

  #[test]
  fn database_failures_are_transient() {
    let e: aula_core::Error =
      Error::Database(tokio_rusqlite::Error::ConnectionClosed).into();
    assert!(e.is_transient());
  }
}
