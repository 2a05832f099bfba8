//! Guarded role areas and the public pages.

use aula_session::{FallbackView, GateDecision};
use axum::{
  Json,
  extract::State,
  http::{StatusCode, Uri},
  response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use crate::{AppState, Backend};

/// `GET /{area}` and everything below it.
pub async fn view<B: Backend>(State(state): State<AppState<B>>, uri: Uri) -> Response {
  let path = uri.path();
  let Some((area, mut gate)) = state.areas.gate_for(path) else {
    return StatusCode::NOT_FOUND.into_response();
  };

  let decision = gate.evaluate(path, &state.store);

  match decision {
    GateDecision::Render => {
      let snapshot = state.store.snapshot();
      Json(json!({
        "area": area,
        "path": path,
        "principal": snapshot.principal().map(|p| p.email.clone()),
        "active_role": snapshot.active_role,
      }))
      .into_response()
    }
    GateDecision::Redirect(to) => Redirect::to(&to).into_response(),
    GateDecision::Fallback(FallbackView::Loading) => "Loading…".into_response(),
    GateDecision::Fallback(FallbackView::Redirecting) => "Redirecting…".into_response(),
    GateDecision::Fallback(FallbackView::Custom(text)) => text.into_response(),
  }
}

/// `GET /login`
pub async fn sign_in_page() -> &'static str { "Sign in" }

/// `GET /signup`
pub async fn sign_up_page() -> &'static str { "Create an account" }

/// `GET /unauthorized`
pub async fn unauthorized_page() -> &'static str {
  "Your account has no role with access to this area."
}
