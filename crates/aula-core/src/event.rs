//! Identity lifecycle events delivered by the identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of lifecycle transition the identity provider reports.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
  SignedIn,
  /// Authoritative: the session is over.
  SignedOut,
  UserUpdated,
  InitialSession,
  TokenRefreshed,
  PasswordRecovery,
}

/// The principal an event refers to, as known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
  pub id:    Uuid,
  pub email: Option<String>,
}

/// A session issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
  pub user:         SessionUser,
  pub access_token: String,
  pub expires_at:   DateTime<Utc>,
}

/// One item of the provider's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
  pub kind:    AuthEventKind,
  pub session: Option<SessionUser>,
}

impl AuthEvent {
  pub fn new(kind: AuthEventKind, session: Option<SessionUser>) -> Self {
    Self { kind, session }
  }

  pub fn signed_out() -> Self { Self::new(AuthEventKind::SignedOut, None) }

  pub fn with_user(kind: AuthEventKind, id: Uuid, email: impl Into<String>) -> Self {
    Self::new(
      kind,
      Some(SessionUser {
        id,
        email: Some(email.into()),
      }),
    )
  }
}
