pub mod admin;
pub mod area;
pub mod auth;
pub mod session;

use uuid::Uuid;

use crate::{AppState, error::Error};

/// The principal the session store currently holds; requests acting on
/// their behalf fail with 401 without one.
pub(crate) fn acting_principal<B>(state: &AppState<B>) -> Result<Uuid, Error> {
  state.store.principal().map(|p| p.id).ok_or(Error::Unauthorized)
}
