//! Role tags and the ordered role set held by a principal.
//!
//! A principal may hold any number of roles. The set keeps insertion order so
//! that a stable *primary* role (the first element) can be derived for
//! consumers that only understand a single role.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Role ────────────────────────────────────────────────────────────────────

/// A role tag, always trimmed and lowercased.
///
/// The four institutional roles have constructors and a home view; any other
/// non-empty tag is accepted as-is.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Role(String);

impl Role {
  pub const ADMIN: &'static str = "admin";
  pub const COORDINATOR: &'static str = "coordinator";
  pub const STUDENT: &'static str = "student";
  pub const TEACHER: &'static str = "teacher";

  /// Normalise `tag` into a role. Blank tags are rejected.
  pub fn new(tag: impl AsRef<str>) -> Result<Self> {
    let tag = tag.as_ref().trim().to_lowercase();
    if tag.is_empty() {
      return Err(Error::InvalidRole(tag));
    }
    Ok(Self(tag))
  }

  pub fn admin() -> Self { Self(Self::ADMIN.to_owned()) }

  pub fn coordinator() -> Self { Self(Self::COORDINATOR.to_owned()) }

  pub fn student() -> Self { Self(Self::STUDENT.to_owned()) }

  pub fn teacher() -> Self { Self(Self::TEACHER.to_owned()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The landing view for principals acting in this role, if it has one.
  pub fn home_path(&self) -> Option<&'static str> {
    match self.0.as_str() {
      Self::ADMIN => Some("/admin"),
      Self::TEACHER => Some("/teacher"),
      Self::COORDINATOR => Some("/coordinator"),
      Self::STUDENT => Some("/student"),
      _ => None,
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for Role {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::new(s) }
}

impl TryFrom<String> for Role {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::new(value) }
}

impl From<Role> for String {
  fn from(role: Role) -> Self { role.0 }
}

impl PartialEq<str> for Role {
  fn eq(&self, other: &str) -> bool { self.0 == other }
}

impl PartialEq<&str> for Role {
  fn eq(&self, other: &&str) -> bool { self.0 == *other }
}

// ─── RoleSet ─────────────────────────────────────────────────────────────────

/// An insertion-ordered set of roles. The first element is the primary role.
///
/// Serialised as a plain JSON array; duplicates in the input are dropped on
/// deserialisation so a persisted set can never carry them back in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSet(Vec<Role>);

impl RoleSet {
  pub fn new() -> Self { Self::default() }

  /// Union of an explicit role list and a legacy single-role field. The
  /// legacy role, when present, becomes the primary role.
  pub fn with_legacy(
    roles: impl IntoIterator<Item = Role>,
    legacy: Option<Role>,
  ) -> Self {
    let mut set: Self = roles.into_iter().collect();
    if let Some(role) = legacy {
      set.insert(role.clone());
      set.promote(&role);
    }
    set
  }

  /// Add `role` at the end. Returns `false` if it was already present.
  pub fn insert(&mut self, role: Role) -> bool {
    if self.contains(&role) {
      return false;
    }
    self.0.push(role);
    true
  }

  /// Remove `role`. When the primary role is removed the next one in
  /// insertion order takes its place.
  pub fn remove(&mut self, role: &Role) -> bool {
    let before = self.0.len();
    self.0.retain(|r| r != role);
    self.0.len() != before
  }

  /// Make `role` the primary role. No-op if it is not a member.
  pub fn promote(&mut self, role: &Role) -> bool {
    match self.0.iter().position(|r| r == role) {
      Some(idx) => {
        let role = self.0.remove(idx);
        self.0.insert(0, role);
        true
      }
      None => false,
    }
  }

  pub fn contains(&self, role: &Role) -> bool { self.0.contains(role) }

  pub fn intersects<'a>(&self, roles: impl IntoIterator<Item = &'a Role>) -> bool {
    roles.into_iter().any(|r| self.contains(r))
  }

  pub fn primary(&self) -> Option<&Role> { self.0.first() }

  /// Keep `current` if it is still a member, otherwise fall back to the
  /// primary role.
  pub fn retain_active(&self, current: Option<&Role>) -> Option<Role> {
    match current {
      Some(role) if self.contains(role) => Some(role.clone()),
      _ => self.primary().cloned(),
    }
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Role> { self.0.iter() }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn as_slice(&self) -> &[Role] { &self.0 }
}

impl FromIterator<Role> for RoleSet {
  fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
    let mut set = Self::default();
    for role in iter {
      set.insert(role);
    }
    set
  }
}

impl From<Vec<Role>> for RoleSet {
  fn from(roles: Vec<Role>) -> Self { roles.into_iter().collect() }
}

impl From<RoleSet> for Vec<Role> {
  fn from(set: RoleSet) -> Self { set.0 }
}

impl<'a> IntoIterator for &'a RoleSet {
  type IntoIter = std::slice::Iter<'a, Role>;
  type Item = &'a Role;

  fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn role(tag: &str) -> Role { Role::new(tag).unwrap() }

  #[test]
  fn tags_are_trimmed_and_lowercased() {
    assert_eq!(role("  Teacher "), Role::teacher());
    assert!(matches!(Role::new("   "), Err(Error::InvalidRole(_))));
  }

  #[test]
  fn custom_tags_have_no_home() {
    assert_eq!(Role::admin().home_path(), Some("/admin"));
    assert_eq!(Role::student().home_path(), Some("/student"));
    assert_eq!(role("librarian").home_path(), None);
  }

  #[test]
  fn collecting_drops_duplicates_and_keeps_order() {
    let set: RoleSet =
      vec![Role::teacher(), Role::admin(), role("TEACHER")].into();
    assert_eq!(set.as_slice(), &[Role::teacher(), Role::admin()]);
    assert_eq!(set.primary(), Some(&Role::teacher()));
  }

  #[test]
  fn legacy_role_is_merged_and_becomes_primary() {
    let set = RoleSet::with_legacy(
      vec![Role::teacher(), Role::student()],
      Some(Role::student()),
    );
    assert_eq!(set.as_slice(), &[Role::student(), Role::teacher()]);

    let set = RoleSet::with_legacy(Vec::new(), Some(Role::admin()));
    assert_eq!(set.as_slice(), &[Role::admin()]);
  }

  #[test]
  fn removing_primary_promotes_next() {
    let mut set: RoleSet = vec![Role::admin(), Role::teacher()].into();
    assert!(set.remove(&Role::admin()));
    assert_eq!(set.primary(), Some(&Role::teacher()));
    assert!(!set.remove(&Role::admin()));
  }

  #[test]
  fn retain_active_falls_back_to_primary() {
    let set: RoleSet = vec![Role::teacher(), Role::student()].into();
    assert_eq!(set.retain_active(Some(&Role::student())), Some(Role::student()));
    assert_eq!(set.retain_active(Some(&Role::admin())), Some(Role::teacher()));
    assert_eq!(set.retain_active(None), Some(Role::teacher()));
    assert_eq!(RoleSet::new().retain_active(Some(&Role::admin())), None);
  }

  #[test]
  fn deserialising_dedupes() {
    let set: RoleSet =
      serde_json::from_str(r#"["admin","teacher","admin"]"#).unwrap();
    assert_eq!(set.len(), 2);
    assert!(serde_json::from_str::<RoleSet>(r#"["admin",""]"#).is_err());
  }
}
