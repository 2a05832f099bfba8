//! Guard policies declared by protected views.

use crate::role::{Role, RoleSet};

/// Where unauthenticated visitors are sent.
pub const SIGN_IN_PATH: &str = "/login";

/// Where principals go when no role-specific home applies.
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// Route prefixes that never require a session.
pub const DEFAULT_PUBLIC_ROUTES: &[&str] =
  &[SIGN_IN_PATH, "/signup", "/reset-password", UNAUTHORIZED_PATH];

/// Access rules for one guarded view.
///
/// An empty allow-list means "any authenticated principal".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardPolicy {
  allowed:       Vec<Role>,
  redirect_to:   Option<String>,
  fallback:      Option<String>,
  public_routes: Vec<String>,
}

impl GuardPolicy {
  /// A policy with no role restriction.
  pub fn authenticated() -> Self { Self::default() }

  /// Restrict the view to `roles`. Order is kept (it decides which held role
  /// the active role is aligned to); duplicates are dropped.
  pub fn allow(roles: impl IntoIterator<Item = Role>) -> Self {
    let mut allowed: Vec<Role> = Vec::new();
    for role in roles {
      if !allowed.contains(&role) {
        allowed.push(role);
      }
    }
    Self {
      allowed,
      ..Self::default()
    }
  }

  /// Like [`GuardPolicy::allow`] but from raw tags; blank tags are skipped.
  pub fn allow_tags<I, S>(tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self::allow(tags.into_iter().filter_map(|t| Role::new(t).ok()))
  }

  pub fn with_redirect(mut self, to: impl Into<String>) -> Self {
    self.redirect_to = Some(to.into());
    self
  }

  pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
    self.fallback = Some(text.into());
    self
  }

  pub fn with_public_route(mut self, prefix: impl Into<String>) -> Self {
    self.public_routes.push(prefix.into());
    self
  }

  pub fn allowed(&self) -> &[Role] { &self.allowed }

  pub fn is_restricted(&self) -> bool { !self.allowed.is_empty() }

  pub fn redirect_to(&self) -> Option<&str> { self.redirect_to.as_deref() }

  pub fn fallback(&self) -> Option<&str> { self.fallback.as_deref() }

  /// Whether `path` is one of the default public routes, one of this
  /// policy's extra public routes, or nested below one of them.
  pub fn is_public(&self, path: &str) -> bool {
    DEFAULT_PUBLIC_ROUTES
      .iter()
      .copied()
      .chain(self.public_routes.iter().map(String::as_str))
      .any(|prefix| {
        path == prefix
          || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
      })
  }

  /// Whether a principal holding `roles` may see the view.
  pub fn admits(&self, roles: &RoleSet) -> bool {
    !self.is_restricted() || roles.intersects(&self.allowed)
  }

  /// The first allowed role (in policy order) that `roles` holds.
  pub fn first_held<'a>(&'a self, roles: &RoleSet) -> Option<&'a Role> {
    self.allowed.iter().find(|r| roles.contains(r))
  }
}
