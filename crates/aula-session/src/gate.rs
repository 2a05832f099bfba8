//! Per-view access decisions.
//!
//! An [`AccessGate`] pairs one [`GuardPolicy`] with the path it is currently
//! rendered at. Each navigation or re-render calls
//! [`AccessGate::evaluate`], which reads the [`SessionStore`] and returns
//! what the view should do.

use aula_core::{
  policy::{GuardPolicy, SIGN_IN_PATH, UNAUTHORIZED_PATH},
  snapshot::{SessionState, UserState},
};

use crate::store::SessionStore;

/// What to show in place of the guarded view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackView {
  /// Identity not resolved yet.
  Loading,
  /// A redirect has been issued and is pending.
  Redirecting,
  /// The policy's own fallback content.
  Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
  Render,
  Redirect(String),
  Fallback(FallbackView),
}

impl GateDecision {
  pub fn is_render(&self) -> bool { matches!(self, Self::Render) }

  pub fn redirect_target(&self) -> Option<&str> {
    match self {
      Self::Redirect(to) => Some(to),
      _ => None,
    }
  }
}

/// Coarse resolution state of the snapshot, as seen by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
  /// Identity unknown, or a resolution is still settling.
  Waiting,
  /// Resolved: nobody is signed in.
  Guest,
  /// Resolved: a principal is signed in.
  Authenticated,
}

impl GateStatus {
  pub fn of(state: &SessionState) -> Self {
    match &state.user {
      UserState::Indeterminate => Self::Waiting,
      // A sign-in may be mid-flight; wait for it before sending anyone to
      // the login page.
      UserState::Absent if !state.ready => Self::Waiting,
      UserState::Absent => Self::Guest,
      UserState::Present(_) => Self::Authenticated,
    }
  }
}

/// Guard for one view.
#[derive(Debug, Clone)]
pub struct AccessGate {
  policy:       GuardPolicy,
  current_path: Option<String>,
  redirected:   Option<String>,
}

impl AccessGate {
  pub fn new(policy: GuardPolicy) -> Self {
    Self {
      policy,
      current_path: None,
      redirected: None,
    }
  }

  pub fn policy(&self) -> &GuardPolicy { &self.policy }

  /// Decide what the view at `path` renders.
  ///
  /// A redirect is issued at most once per path and target; later
  /// evaluations of the same path return the policy's fallback (or
  /// [`FallbackView::Redirecting`]) until the path or the target changes.
  /// When the principal is admitted through a role other than the active
  /// one, the active role is moved to the first allowed role they hold.
  pub fn evaluate(&mut self, path: &str, store: &SessionStore) -> GateDecision {
    if self.current_path.as_deref() != Some(path) {
      self.current_path = Some(path.to_owned());
      self.redirected = None;
    }

    let state = store.snapshot();
    match GateStatus::of(&state) {
      GateStatus::Waiting => self.waiting(),
      _ if self.policy.is_public(path) => GateDecision::Render,
      GateStatus::Guest => self.redirect(path, SIGN_IN_PATH.to_owned()),
      GateStatus::Authenticated => self.authorize(path, &state, store),
    }
  }

  fn authorize(
    &mut self,
    path: &str,
    state: &SessionState,
    store: &SessionStore,
  ) -> GateDecision {
    if !self.policy.is_restricted() {
      return GateDecision::Render;
    }

    let roles = state.roles();
    if self.policy.admits(&roles) {
      let active_allowed = state
        .active_role
        .as_ref()
        .is_some_and(|active| self.policy.allowed().contains(active));
      if !active_allowed {
        if let Some(role) = self.policy.first_held(&roles) {
          tracing::debug!(%role, path, "aligning active role with guarded view");
          store.set_active_role(Some(role.clone()));
        }
      }
      return GateDecision::Render;
    }

    let target = self
      .policy
      .redirect_to()
      .map(str::to_owned)
      .or_else(|| {
        roles
          .primary()
          .and_then(|role| role.home_path())
          .map(str::to_owned)
      })
      .unwrap_or_else(|| UNAUTHORIZED_PATH.to_owned());
    self.redirect(path, target)
  }

  fn redirect(&mut self, path: &str, target: String) -> GateDecision {
    if self.redirected.as_deref() == Some(target.as_str()) {
      return GateDecision::Fallback(match self.policy.fallback() {
        Some(text) => FallbackView::Custom(text.to_owned()),
        None => FallbackView::Redirecting,
      });
    }
    tracing::info!(from = path, to = %target, "redirecting");
    self.redirected = Some(target.clone());
    GateDecision::Redirect(target)
  }

  fn waiting(&self) -> GateDecision {
    GateDecision::Fallback(match self.policy.fallback() {
      Some(text) => FallbackView::Custom(text.to_owned()),
      None => FallbackView::Loading,
    })
  }
}
