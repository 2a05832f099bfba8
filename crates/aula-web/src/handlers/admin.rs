//! Administration endpoints. The acting principal is whoever the session
//! store holds; the data provider decides whether they may write.

use aula_core::{
  principal::AccountStatus,
  provider::{NewProfile, Profile},
  role::Role,
};
use aula_session::with_timeout;
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, Backend, error::Error, handlers::acting_principal};

#[derive(Deserialize)]
pub struct NewUser {
  pub email:        String,
  pub display_name: Option<String>,
  #[serde(default)]
  pub status:       AccountStatus,
}

/// `POST /api/users`
pub async fn create_user<B: Backend>(
  State(state): State<AppState<B>>,
  Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<Profile>), Error> {
  let actor = acting_principal(&state)?;
  if body.email.trim().is_empty() {
    return Err(Error::BadRequest("email is required".into()));
  }
  let input = NewProfile {
    email:        body.email,
    display_name: body.display_name,
    status:       body.status,
  };
  let profile = with_timeout(
    "create_profile",
    state.request_timeout(),
    state.backend.create_profile(actor, input),
  )
  .await?;
  Ok((StatusCode::CREATED, Json(profile)))
}

#[derive(Deserialize)]
pub struct RoleList {
  pub roles: Vec<String>,
}

/// `PUT /api/users/{id}/roles` — replace the principal's role set.
pub async fn assign_roles<B: Backend>(
  State(state): State<AppState<B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<RoleList>,
) -> Result<StatusCode, Error> {
  let actor = acting_principal(&state)?;
  let roles = body
    .roles
    .iter()
    .map(Role::new)
    .collect::<aula_core::Result<Vec<_>>>()?;
  with_timeout(
    "assign_roles",
    state.request_timeout(),
    state.backend.assign_roles(actor, id, &roles),
  )
  .await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct StatusUpdate {
  pub status: AccountStatus,
}

/// `PUT /api/users/{id}/status`
pub async fn set_status<B: Backend>(
  State(state): State<AppState<B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<StatusUpdate>,
) -> Result<StatusCode, Error> {
  let actor = acting_principal(&state)?;
  with_timeout(
    "set_status",
    state.request_timeout(),
    state.backend.set_status(actor, id, body.status),
  )
  .await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusView {
  pub status: AccountStatus,
}

/// `POST /api/users/{id}/dropped` — flip the dropped flag.
pub async fn toggle_dropped<B: Backend>(
  State(state): State<AppState<B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StatusView>, Error> {
  let actor = acting_principal(&state)?;
  let status = with_timeout(
    "toggle_dropped",
    state.request_timeout(),
    state.backend.toggle_dropped(actor, id),
  )
  .await?;
  Ok(Json(StatusView { status }))
}

#[derive(Deserialize)]
pub struct Search {
  pub search: Option<String>,
}

/// `GET /api/roles/{role}/users?search=`
pub async fn list_by_role<B: Backend>(
  State(state): State<AppState<B>>,
  Path(role): Path<String>,
  Query(query): Query<Search>,
) -> Result<Json<Vec<Profile>>, Error> {
  acting_principal(&state)?;
  let role = Role::new(&role)?;
  let profiles = with_timeout(
    "list_by_role",
    state.request_timeout(),
    state.backend.list_by_role(&role, query.search.as_deref()),
  )
  .await?;
  Ok(Json(profiles))
}
