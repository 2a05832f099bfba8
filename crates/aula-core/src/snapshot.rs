//! The identity snapshot held by the session store, and its persisted form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  principal::Principal,
  role::{Role, RoleSet},
};

// ─── User tri-state ──────────────────────────────────────────────────────────

/// Whether the current user is known.
///
/// `Indeterminate` is *not* the same as `Absent`: the first means identity
/// has not been resolved yet and nothing may be decided from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UserState {
  #[default]
  Indeterminate,
  Absent,
  Present(Principal),
}

impl UserState {
  pub fn is_indeterminate(&self) -> bool { matches!(self, Self::Indeterminate) }

  pub fn is_absent(&self) -> bool { matches!(self, Self::Absent) }

  pub fn principal(&self) -> Option<&Principal> {
    match self {
      Self::Present(p) => Some(p),
      _ => None,
    }
  }

  pub fn principal_mut(&mut self) -> Option<&mut Principal> {
    match self {
      Self::Present(p) => Some(p),
      _ => None,
    }
  }
}

// ─── Session state ───────────────────────────────────────────────────────────

/// Everything the session store holds: the identity snapshot plus the
/// loading/readiness flags the gate and views consult.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
  pub user:         UserState,
  /// The role the UI is currently acting in. Always a member of the
  /// principal's role set, or `None` when that set is empty.
  pub active_role:  Option<Role>,
  /// A visible identity resolution is in flight.
  pub auth_loading: bool,
  /// Persisted state has been loaded (or found missing).
  pub hydrated:     bool,
  /// No identity resolution is pending; an absent user really is absent.
  pub ready:        bool,
}

impl Default for SessionState {
  fn default() -> Self {
    Self {
      user:         UserState::Indeterminate,
      active_role:  None,
      auth_loading: true,
      hydrated:     false,
      ready:        false,
    }
  }
}

impl SessionState {
  pub fn principal(&self) -> Option<&Principal> { self.user.principal() }

  /// The principal's role set; empty when no user is present.
  pub fn roles(&self) -> RoleSet {
    self.principal().map(|p| p.roles.clone()).unwrap_or_default()
  }

  pub fn primary_role(&self) -> Option<&Role> {
    self.principal().and_then(Principal::primary_role)
  }

  pub fn has_any_role(&self, roles: &[Role]) -> bool {
    self
      .principal()
      .is_some_and(|p| p.roles.intersects(roles.iter()))
  }

  /// `active_role` is `None` or a member of the role set. Role-set
  /// uniqueness is guaranteed by [`RoleSet`] itself.
  pub fn active_role_is_consistent(&self) -> bool {
    match (&self.active_role, self.principal()) {
      (None, Some(p)) => p.roles.is_empty(),
      (None, None) => true,
      (Some(role), Some(p)) => p.roles.contains(role),
      (Some(_), None) => false,
    }
  }
}

// ─── Persisted form ──────────────────────────────────────────────────────────

/// The subset of [`SessionState`] that survives a reload. Loading and
/// readiness flags are never persisted, and neither are tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
  pub user:        Option<Principal>,
  pub active_role: Option<Role>,
  pub saved_at:    DateTime<Utc>,
}
