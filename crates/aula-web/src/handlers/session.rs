//! Read and steer the session snapshot.

use aula_core::{principal::Principal, role::Role, snapshot::SessionState};
use aula_session::GateStatus;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::{AppState, Backend, error::Error};

/// Client-facing projection of the session snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
  pub status:       String,
  pub user:         Option<Principal>,
  pub roles:        Vec<Role>,
  pub primary_role: Option<Role>,
  pub active_role:  Option<Role>,
  pub auth_loading: bool,
  pub hydrated:     bool,
  pub ready:        bool,
}

impl From<SessionState> for SessionView {
  fn from(state: SessionState) -> Self {
    let status = match GateStatus::of(&state) {
      GateStatus::Waiting => "waiting",
      GateStatus::Guest => "guest",
      GateStatus::Authenticated => "authenticated",
    };
    Self {
      status:       status.to_owned(),
      roles:        state.roles().into(),
      primary_role: state.primary_role().cloned(),
      user:         state.principal().cloned(),
      active_role:  state.active_role,
      auth_loading: state.auth_loading,
      hydrated:     state.hydrated,
      ready:        state.ready,
    }
  }
}

/// `GET /session`
pub async fn show<B: Backend>(State(state): State<AppState<B>>) -> Json<SessionView> {
  Json(state.store.snapshot().into())
}

#[derive(Deserialize)]
pub struct ActiveRole {
  pub role: String,
}

/// `POST /session/active-role` — switch the role the principal acts in.
/// Only held roles are accepted.
pub async fn set_active_role<B: Backend>(
  State(state): State<AppState<B>>,
  Json(body): Json<ActiveRole>,
) -> Result<Json<SessionView>, Error> {
  let role = Role::new(&body.role)?;
  let principal = state.store.principal().ok_or(Error::Unauthorized)?;
  if !principal.roles.contains(&role) {
    return Err(Error::BadRequest(format!("role {role} is not held")));
  }
  state.store.set_active_role(Some(role));
  Ok(Json(state.store.snapshot().into()))
}
