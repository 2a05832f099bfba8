//! Sign-up, sign-in, sign-out, focus and password endpoints.

use aula_core::{event::AuthSession, policy::SIGN_IN_PATH, role::Role};
use aula_session::with_timeout;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use uuid::Uuid;

use crate::{AppState, Backend, error::Error};

const MIN_PASSWORD_LEN: usize = 6;
const MIN_NAME_LEN: usize = 3;

fn check_password(password: &str) -> Result<(), Error> {
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(Error::BadRequest(format!(
      "password must be at least {MIN_PASSWORD_LEN} characters"
    )));
  }
  Ok(())
}

#[derive(Deserialize)]
pub struct Credentials {
  pub email:    String,
  pub password: String,
}

/// Where the client should navigate after a sign-in or sign-out.
#[derive(Debug, Serialize, Deserialize)]
pub struct Navigation {
  pub redirect_to: String,
  pub active_role: Option<Role>,
}

/// `POST /auth/login` — sign in, wait for the session to resolve, and send
/// the principal to their primary role's home.
pub async fn login<B: Backend>(
  State(state): State<AppState<B>>,
  Json(creds): Json<Credentials>,
) -> Result<Json<Navigation>, Error> {
  let timeout = state.request_timeout();
  let session: AuthSession = with_timeout(
    "sign_in",
    timeout,
    state.backend.sign_in_with_password(&creds.email, &creds.password),
  )
  .await?;

  let id = session.user.id;
  let resolved = state
    .store
    .wait_until(timeout, |s| s.ready && s.principal().is_some_and(|p| p.id == id))
    .await?;

  let redirect_to = resolved
    .primary_role()
    .and_then(Role::home_path)
    .unwrap_or(aula_core::policy::UNAUTHORIZED_PATH)
    .to_owned();
  tracing::info!(principal = %id, %redirect_to, "sign-in complete");
  Ok(Json(Navigation {
    redirect_to,
    active_role: resolved.active_role,
  }))
}

/// `POST /auth/logout`
pub async fn logout<B: Backend>(
  State(state): State<AppState<B>>,
) -> Result<Json<Navigation>, Error> {
  let timeout = state.request_timeout();
  with_timeout("sign_out", timeout, state.backend.sign_out()).await?;
  state
    .store
    .wait_until(timeout, |s| s.user.is_absent())
    .await?;
  Ok(Json(Navigation {
    redirect_to: SIGN_IN_PATH.to_owned(),
    active_role: None,
  }))
}

/// `POST /auth/focus` — the client regained focus or visibility.
pub async fn focus<B: Backend>(State(state): State<AppState<B>>) -> StatusCode {
  if state.sync.notify_focus().is_none() {
    tracing::debug!("focus revalidation already pending");
  }
  StatusCode::ACCEPTED
}

#[derive(Deserialize)]
pub struct NewPassword {
  pub password: String,
}

/// `POST /auth/password` — change the signed-in principal's password.
pub async fn update_password<B: Backend>(
  State(state): State<AppState<B>>,
  Json(body): Json<NewPassword>,
) -> Result<StatusCode, Error> {
  check_password(&body.password)?;
  with_timeout(
    "update_password",
    state.request_timeout(),
    state.backend.update_password(&body.password),
  )
  .await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ResetRequest {
  pub email: String,
}

/// `POST /auth/reset` — always 202, whether or not the address is known.
pub async fn request_reset<B: Backend>(
  State(state): State<AppState<B>>,
  Json(body): Json<ResetRequest>,
) -> Result<StatusCode, Error> {
  with_timeout(
    "request_password_reset",
    state.request_timeout(),
    state.backend.request_password_reset(body.email.trim()),
  )
  .await?;
  Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct ResetCompletion {
  pub token:    String,
  pub password: String,
}

/// `POST /auth/reset/complete` — redeem a reset token and set a new
/// password. The principal then signs in with it.
pub async fn complete_reset<B: Backend>(
  State(state): State<AppState<B>>,
  Json(body): Json<ResetCompletion>,
) -> Result<Json<Navigation>, Error> {
  check_password(&body.password)?;
  let id = with_timeout(
    "complete_password_reset",
    state.request_timeout(),
    state
      .backend
      .complete_password_reset(body.token.trim(), &body.password),
  )
  .await?;
  tracing::info!(principal = %id, "password recovered");
  Ok(Json(Navigation {
    redirect_to: SIGN_IN_PATH.to_owned(),
    active_role: None,
  }))
}

#[derive(Deserialize)]
pub struct SignUp {
  pub email:        String,
  pub password:     String,
  pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Registered {
  pub id:          Uuid,
  pub redirect_to: String,
}

/// `POST /signup` — open an account with no roles. Nobody is signed in by
/// this; the client is sent to the sign-in page.
pub async fn sign_up<B: Backend>(
  State(state): State<AppState<B>>,
  Json(body): Json<SignUp>,
) -> Result<(StatusCode, Json<Registered>), Error> {
  let email = body.email.trim();
  if email.is_empty() || !email.contains('@') {
    return Err(Error::BadRequest("a valid email is required".into()));
  }
  check_password(&body.password)?;
  let name = body
    .display_name
    .as_deref()
    .map(str::trim)
    .filter(|name| !name.is_empty());
  if name.is_some_and(|name| name.chars().count() < MIN_NAME_LEN) {
    return Err(Error::BadRequest(format!(
      "name must be at least {MIN_NAME_LEN} characters"
    )));
  }

  let user = with_timeout(
    "sign_up",
    state.request_timeout(),
    state.backend.sign_up(email, &body.password, name),
  )
  .await?;
  tracing::info!(principal = %user.id, "account registered");
  Ok((
    StatusCode::CREATED,
    Json(Registered {
      id:          user.id,
      redirect_to: SIGN_IN_PATH.to_owned(),
    }),
  ))
}
