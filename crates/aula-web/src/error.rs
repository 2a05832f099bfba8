//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// No principal is signed in.
  #[error("not signed in")]
  Unauthorized,
  #[error("invalid credentials")]
  InvalidCredentials,
  /// The data provider refused the write for the acting principal.
  #[error("{0}")]
  Forbidden(String),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("{0}")]
  Conflict(String),
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("{0}")]
  Timeout(String),
  #[error("backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<aula_core::Error> for Error {
  fn from(e: aula_core::Error) -> Self {
    use aula_core::Error as Core;
    match e {
      Core::PermissionDenied(msg) => Self::Forbidden(msg),
      Core::NotFound(what) => Self::NotFound(what),
      Core::Conflict(msg) => Self::Conflict(msg),
      Core::InvalidCredentials => Self::InvalidCredentials,
      Core::NoSession => Self::Unauthorized,
      Core::InvalidRole(tag) => Self::BadRequest(format!("invalid role tag {tag:?}")),
      e @ Core::Timeout { .. } => Self::Timeout(e.to_string()),
      other => Self::Backend(Box::new(other)),
    }
  }
}

impl Error {
  pub fn status(&self) -> StatusCode {
    match self {
      Error::Unauthorized | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
      Error::Forbidden(_) => StatusCode::FORBIDDEN,
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::Conflict(_) => StatusCode::CONFLICT,
      Error::BadRequest(_) => StatusCode::BAD_REQUEST,
      Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
      Error::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
