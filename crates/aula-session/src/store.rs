//! [`SessionStore`] — the process-wide identity snapshot.
//!
//! All reads go through accessors and all writes through the mutation
//! methods below, which keep two invariants after every call:
//!
//! - the role set has no duplicates (guaranteed by [`RoleSet`]);
//! - `active_role` is `None` or a member of the current role set.

use std::{sync::Arc, time::Duration};

use aula_core::{
  Error, Result,
  principal::{Principal, UserFields},
  provider::SnapshotStorage,
  role::{Role, RoleSet},
  snapshot::{PersistedSnapshot, SessionState, UserState},
};
use chrono::Utc;
use tokio::{sync::watch, task::JoinHandle};

/// Shared handle to the session snapshot.
///
/// Cloning is cheap; every clone observes and mutates the same state.
/// Subscribers (views, the persistence task) are woken only by mutations that
/// actually changed something.
#[derive(Clone)]
pub struct SessionStore {
  tx: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionStore {
  fn default() -> Self { Self::new() }
}

impl SessionStore {
  /// A store in the indeterminate, loading state.
  pub fn new() -> Self {
    let (tx, _) = watch::channel(SessionState::default());
    Self { tx: Arc::new(tx) }
  }

  /// Apply `f` and notify subscribers if the state changed.
  fn mutate(&self, f: impl FnOnce(&mut SessionState)) -> bool {
    self.tx.send_if_modified(|state| {
      let before = state.clone();
      f(state);
      debug_assert!(
        state.active_role_is_consistent(),
        "active role {:?} escaped the role set",
        state.active_role
      );
      *state != before
    })
  }

  // ── User ──────────────────────────────────────────────────────────────────

  /// Replace the user wholesale. The role set is the union of the explicit
  /// list and the legacy single role; the active role is kept if the new set
  /// still contains it, otherwise it becomes the primary role.
  pub fn set_user(&self, fields: UserFields) {
    let principal = fields.into_principal();
    self.mutate(|s| {
      s.active_role = principal.roles.retain_active(s.active_role.as_ref());
      s.user = UserState::Present(principal);
    });
  }

  /// Reset to the absent state (resolved, no session). Distinct from the
  /// indeterminate state the store starts in.
  pub fn clear_user(&self) {
    self.mutate(|s| {
      s.user = UserState::Absent;
      s.active_role = None;
    });
  }

  // ── Roles ─────────────────────────────────────────────────────────────────

  /// Run `f` on the present principal's role set, then re-derive the active
  /// role. No-op without a present user.
  fn mutate_roles(&self, f: impl FnOnce(&mut RoleSet)) {
    self.mutate(|s| {
      let Some(principal) = s.user.principal_mut() else {
        return;
      };
      f(&mut principal.roles);
      s.active_role = principal.roles.retain_active(s.active_role.as_ref());
    });
  }

  /// Replace the role set. The current primary role stays primary if it is
  /// still held.
  pub fn set_roles(&self, roles: impl IntoIterator<Item = Role>) {
    let next: RoleSet = roles.into_iter().collect();
    self.mutate_roles(move |current| {
      let mut next = next;
      if let Some(primary) = current.primary() {
        next.promote(primary);
      }
      *current = next;
    });
  }

  pub fn add_role(&self, role: Role) {
    self.mutate_roles(move |roles| {
      roles.insert(role);
    });
  }

  /// Remove `role`. If it was the active role, the active role falls back to
  /// the new primary role.
  pub fn remove_role(&self, role: &Role) {
    self.mutate_roles(|roles| {
      roles.remove(role);
    });
  }

  /// Legacy single-role setter: add `role` and make it primary.
  pub fn set_primary_role(&self, role: Role) {
    self.mutate_roles(move |roles| {
      roles.insert(role.clone());
      roles.promote(&role);
    });
  }

  /// Select the role the UI acts in. A role the principal does not hold is
  /// never accepted; the primary role (or `None`) is used instead.
  pub fn set_active_role(&self, role: Option<Role>) {
    self.mutate(|s| {
      let roles = s.roles();
      s.active_role = match role {
        Some(r) if roles.contains(&r) => Some(r),
        Some(r) => {
          tracing::warn!(role = %r, "refusing active role the principal does not hold");
          roles.primary().cloned()
        }
        None => roles.primary().cloned(),
      };
    });
  }

  // ── Flags ─────────────────────────────────────────────────────────────────

  pub fn start_auth_loading(&self) { self.mutate(|s| s.auth_loading = true); }

  pub fn stop_auth_loading(&self) { self.mutate(|s| s.auth_loading = false); }

  pub fn set_ready(&self, ready: bool) { self.mutate(|s| s.ready = ready); }

  pub fn set_hydrated(&self, hydrated: bool) {
    self.mutate(|s| s.hydrated = hydrated);
  }

  /// Soft reset: absent, not loading, hydrated, not ready.
  pub fn reset(&self) {
    self.mutate(|s| {
      *s = SessionState {
        user:         UserState::Absent,
        active_role:  None,
        auth_loading: false,
        hydrated:     true,
        ready:        false,
      };
    });
  }

  // ── Queries ───────────────────────────────────────────────────────────────

  pub fn snapshot(&self) -> SessionState { self.tx.borrow().clone() }

  pub fn principal(&self) -> Option<Principal> {
    self.tx.borrow().principal().cloned()
  }

  pub fn roles(&self) -> RoleSet { self.tx.borrow().roles() }

  pub fn primary_role(&self) -> Option<Role> {
    self.tx.borrow().primary_role().cloned()
  }

  pub fn active_role(&self) -> Option<Role> {
    self.tx.borrow().active_role.clone()
  }

  pub fn has_any_role(&self, roles: &[Role]) -> bool {
    self.tx.borrow().has_any_role(roles)
  }

  pub fn subscribe(&self) -> watch::Receiver<SessionState> { self.tx.subscribe() }

  /// Wait until `predicate` holds, for at most `within`.
  pub async fn wait_until(
    &self,
    within: Duration,
    predicate: impl FnMut(&SessionState) -> bool,
  ) -> Result<SessionState> {
    let mut rx = self.tx.subscribe();
    match tokio::time::timeout(within, rx.wait_for(predicate)).await {
      Ok(Ok(state)) => Ok(state.clone()),
      // The sender lives as long as `self`, so the channel cannot close here.
      Ok(Err(_)) => Err(Error::NoSession),
      Err(_) => Err(Error::Timeout {
        operation: "wait_for_session",
        after:     within,
      }),
    }
  }

  /// Wait for the current resolution to settle.
  pub async fn wait_ready(&self, within: Duration) -> Result<SessionState> {
    self.wait_until(within, |s| s.ready).await
  }

  // ── Persistence ───────────────────────────────────────────────────────────

  /// The persisted projection: user and active role only.
  pub fn persisted(&self) -> PersistedSnapshot {
    let state = self.tx.borrow();
    PersistedSnapshot {
      user:        state.principal().cloned(),
      active_role: state.active_role.clone(),
      saved_at:    Utc::now(),
    }
  }

  /// Restore a persisted snapshot. Flags are reset (hydrated, not loading,
  /// not ready) and a persisted active role that is no longer held is
  /// repaired to the primary role.
  pub fn rehydrate(&self, persisted: Option<PersistedSnapshot>) {
    self.mutate(|s| {
      match persisted {
        Some(PersistedSnapshot {
          user: Some(principal),
          active_role,
          ..
        }) => {
          s.active_role = principal.roles.retain_active(active_role.as_ref());
          if s.active_role != active_role {
            tracing::info!(
              persisted = ?active_role,
              repaired = ?s.active_role,
              "persisted active role no longer held"
            );
          }
          s.user = UserState::Present(principal);
        }
        _ => {
          s.user = UserState::Absent;
          s.active_role = None;
        }
      }
      s.hydrated = true;
      s.auth_loading = false;
      s.ready = false;
    });
  }

  /// Load from `storage` and rehydrate. A failed load rehydrates as absent.
  pub async fn rehydrate_from<S: SnapshotStorage>(&self, storage: &S) {
    match storage.load().await {
      Ok(persisted) => self.rehydrate(persisted),
      Err(e) => {
        let e: Error = e.into();
        tracing::warn!(error = %e, "failed to load persisted session; starting signed out");
        self.rehydrate(None);
      }
    }
  }

  /// Write the persisted projection now. An absent user clears the storage.
  pub async fn persist_to<S: SnapshotStorage>(&self, storage: &S) -> Result<()> {
    let snapshot = self.persisted();
    if snapshot.user.is_some() {
      storage.save(&snapshot).await.map_err(Into::into)
    } else {
      storage.clear().await.map_err(Into::into)
    }
  }

  /// Keep `storage` in step with the store: save whenever the user or the
  /// active role changes, clear on sign-out. Runs until every handle to the
  /// store has been dropped.
  pub fn spawn_persistence<S>(&self, storage: Arc<S>) -> JoinHandle<()>
  where
    S: SnapshotStorage + 'static,
  {
    let mut rx = self.subscribe();
    // A strong handle inside the task would keep the channel open forever.
    let weak = Arc::downgrade(&self.tx);

    tokio::spawn(async move {
      let mut last = {
        let s = rx.borrow_and_update();
        (s.user.clone(), s.active_role.clone())
      };
      while rx.changed().await.is_ok() {
        let current = {
          let s = rx.borrow_and_update();
          (s.user.clone(), s.active_role.clone())
        };
        if current == last || current.0.is_indeterminate() {
          continue;
        }
        last = current;

        let Some(tx) = weak.upgrade() else { break };
        let store = SessionStore { tx };
        if let Err(e) = store.persist_to(storage.as_ref()).await {
          tracing::warn!(error = %e, "failed to persist session snapshot");
        }
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;
  use crate::persist::MemoryStorage;

  fn fields(roles: &[Role]) -> UserFields {
    UserFields::new(Uuid::new_v4(), "ana@example.edu").with_roles(roles.to_vec())
  }

  fn assert_invariants(store: &SessionStore) {
    let state = store.snapshot();
    assert!(state.active_role_is_consistent(), "inconsistent: {state:?}");
    let roles = state.roles();
    let mut tags: Vec<_> = roles.iter().map(Role::as_str).collect();
    tags.sort_unstable();
    tags.dedup();
    assert_eq!(tags.len(), roles.len(), "duplicate roles: {roles:?}");
  }

  // ─── User ──────────────────────────────────────────────────────────────────

  #[test]
  fn set_user_picks_primary_as_active() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::teacher(), Role::admin()]));
    assert_eq!(store.active_role(), Some(Role::teacher()));
    assert_eq!(store.primary_role(), Some(Role::teacher()));
  }

  #[test]
  fn set_user_keeps_active_role_when_still_held() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::admin(), Role::teacher()]));
    store.set_active_role(Some(Role::teacher()));

    store.set_user(fields(&[Role::admin(), Role::teacher(), Role::student()]));
    assert_eq!(store.active_role(), Some(Role::teacher()));

    store.set_user(fields(&[Role::student()]));
    assert_eq!(store.active_role(), Some(Role::student()));
  }

  #[test]
  fn set_user_merges_legacy_role() {
    let store = SessionStore::new();
    store.set_user(UserFields {
      legacy_role: Some(Role::coordinator()),
      ..fields(&[Role::teacher()])
    });
    assert_eq!(
      store.roles().as_slice(),
      &[Role::coordinator(), Role::teacher()]
    );
    assert_eq!(store.active_role(), Some(Role::coordinator()));
  }

  #[test]
  fn clear_user_is_absent_not_indeterminate() {
    let store = SessionStore::new();
    assert!(store.snapshot().user.is_indeterminate());
    store.set_user(fields(&[Role::admin()]));
    store.clear_user();
    let state = store.snapshot();
    assert!(state.user.is_absent());
    assert_eq!(state.active_role, None);
    assert!(state.roles().is_empty());
  }

  // ─── Roles ─────────────────────────────────────────────────────────────────

  #[test]
  fn role_mutations_without_user_are_noops() {
    let store = SessionStore::new();
    store.add_role(Role::admin());
    store.set_roles([Role::teacher()]);
    store.set_active_role(Some(Role::admin()));
    assert!(store.roles().is_empty());
    assert_eq!(store.active_role(), None);
    assert!(store.snapshot().user.is_indeterminate());
  }

  #[test]
  fn set_roles_preserves_primary_and_active() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::admin(), Role::teacher()]));
    store.set_active_role(Some(Role::teacher()));

    store.set_roles([Role::student(), Role::teacher(), Role::admin(), Role::student()]);
    assert_eq!(store.primary_role(), Some(Role::admin()));
    assert_eq!(store.active_role(), Some(Role::teacher()));
    assert_eq!(store.roles().len(), 3);

    store.set_roles(Vec::new());
    assert_eq!(store.active_role(), None);
    assert_eq!(store.primary_role(), None);
  }

  #[test]
  fn removing_active_role_demotes_to_primary() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::admin(), Role::teacher(), Role::student()]));
    store.set_active_role(Some(Role::student()));

    store.remove_role(&Role::student());
    assert_eq!(store.active_role(), Some(Role::admin()));

    store.remove_role(&Role::admin());
    assert_eq!(store.active_role(), Some(Role::teacher()));
    assert_eq!(store.primary_role(), Some(Role::teacher()));
  }

  #[test]
  fn add_role_to_empty_set_activates_it() {
    let store = SessionStore::new();
    store.set_user(fields(&[]));
    assert_eq!(store.active_role(), None);
    store.add_role(Role::teacher());
    assert_eq!(store.active_role(), Some(Role::teacher()));
    store.add_role(Role::teacher());
    assert_eq!(store.roles().len(), 1);
  }

  #[test]
  fn set_active_role_rejects_unheld_roles() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::teacher(), Role::student()]));
    store.set_active_role(Some(Role::student()));
    assert_eq!(store.active_role(), Some(Role::student()));

    store.set_active_role(Some(Role::admin()));
    assert_eq!(store.active_role(), Some(Role::teacher()));

    store.set_active_role(None);
    assert_eq!(store.active_role(), Some(Role::teacher()));
  }

  #[test]
  fn set_primary_role_adds_and_promotes() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::teacher()]));
    store.set_primary_role(Role::coordinator());
    assert_eq!(store.primary_role(), Some(Role::coordinator()));
    assert_eq!(store.active_role(), Some(Role::teacher()));
  }

  #[test]
  fn has_any_role_queries_membership() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::student()]));
    assert!(store.has_any_role(&[Role::admin(), Role::student()]));
    assert!(!store.has_any_role(&[Role::admin()]));
    assert!(!store.has_any_role(&[]));
  }

  #[test]
  fn invariants_hold_across_mixed_mutation_sequences() {
    let pool = [
      Role::admin(),
      Role::teacher(),
      Role::student(),
      Role::coordinator(),
      Role::new("librarian").unwrap(),
    ];
    let store = SessionStore::new();
    store.set_user(fields(&[Role::teacher()]));

    // Deterministic pseudo-random walk over the mutation contract.
    let mut seed: u32 = 0x2545_f491;
    for _ in 0..2_000 {
      seed ^= seed << 13;
      seed ^= seed >> 17;
      seed ^= seed << 5;
      let role = pool[(seed >> 8) as usize % pool.len()].clone();
      match seed % 5 {
        0 => {
          let n = (seed >> 4) as usize % 4;
          store.set_roles(pool.iter().cycle().skip(seed as usize % 3).take(n).cloned());
        }
        1 => store.add_role(role),
        2 => store.remove_role(&role),
        3 => store.set_active_role(Some(role)),
        _ => store.set_active_role(None),
      }
      assert_invariants(&store);
    }
  }

  #[test]
  fn reset_is_absent_and_hydrated() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::admin()]));
    store.set_ready(true);
    store.reset();
    let state = store.snapshot();
    assert!(state.user.is_absent());
    assert!(state.hydrated);
    assert!(!state.ready);
    assert!(!state.auth_loading);
  }

  #[test]
  fn subscribers_are_not_woken_by_noop_mutations() {
    let store = SessionStore::new();
    let mut rx = store.subscribe();
    rx.borrow_and_update();

    store.set_active_role(None);
    assert!(!rx.has_changed().unwrap());

    store.clear_user();
    assert!(rx.has_changed().unwrap());
  }

  // ─── Persistence ───────────────────────────────────────────────────────────

  #[test]
  fn rehydrate_resets_flags_and_repairs_active_role() {
    let store = SessionStore::new();
    store.set_ready(true);

    let principal = fields(&[Role::teacher()]).into_principal();
    store.rehydrate(Some(PersistedSnapshot {
      user:        Some(principal.clone()),
      active_role: Some(Role::admin()),
      saved_at:    Utc::now(),
    }));

    let state = store.snapshot();
    assert_eq!(state.principal(), Some(&principal));
    assert_eq!(state.active_role, Some(Role::teacher()));
    assert!(state.hydrated);
    assert!(!state.ready);
    assert!(!state.auth_loading);
  }

  #[test]
  fn rehydrate_without_snapshot_is_absent() {
    let store = SessionStore::new();
    store.rehydrate(None);
    assert!(store.snapshot().user.is_absent());
  }

  #[test]
  fn repeated_rehydration_does_not_drift() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::coordinator(), Role::teacher()]));
    store.set_active_role(Some(Role::teacher()));

    let once = SessionStore::new();
    once.rehydrate(Some(store.persisted()));

    let twice = SessionStore::new();
    twice.rehydrate(Some(store.persisted()));
    twice.rehydrate(Some(twice.persisted()));

    assert_eq!(once.roles(), twice.roles());
    assert_eq!(once.active_role(), twice.active_role());
    assert_eq!(twice.active_role(), Some(Role::teacher()));
  }

  #[test]
  fn persisted_snapshot_carries_no_flags() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::student()]));
    let json = serde_json::to_value(store.persisted()).unwrap();
    let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys.len(), 3, "{keys:?}");
    assert!(json.get("ready").is_none());
    assert!(json.get("auth_loading").is_none());
  }

  #[tokio::test]
  async fn persist_and_rehydrate_through_storage() {
    let storage = MemoryStorage::default();
    let store = SessionStore::new();
    store.set_user(fields(&[Role::admin(), Role::teacher()]));
    store.set_active_role(Some(Role::teacher()));
    store.persist_to(&storage).await.unwrap();

    let reloaded = SessionStore::new();
    reloaded.rehydrate_from(&storage).await;
    assert_eq!(reloaded.roles(), store.roles());
    assert_eq!(reloaded.active_role(), Some(Role::teacher()));

    store.clear_user();
    store.persist_to(&storage).await.unwrap();
    assert!(storage.load_now().is_none());
  }

  /// Storage whose every call fails.
  struct BrokenStorage;

  impl SnapshotStorage for BrokenStorage {
    type Error = Error;

    async fn load(&self) -> Result<Option<PersistedSnapshot>> {
      Err(Error::Backend("disk unreadable".into()))
    }

    async fn save(&self, _: &PersistedSnapshot) -> Result<()> {
      Err(Error::Backend("disk unreadable".into()))
    }

    async fn clear(&self) -> Result<()> { Err(Error::Backend("disk unreadable".into())) }
  }

  #[tokio::test]
  async fn unreadable_storage_rehydrates_as_absent() {
    let store = SessionStore::new();
    store.set_user(fields(&[Role::teacher()]));
    store.set_ready(true);

    store.rehydrate_from(&BrokenStorage).await;
    let state = store.snapshot();
    assert!(state.user.is_absent());
    assert_eq!(state.active_role, None);
    assert!(state.hydrated);
    assert!(!state.ready);
    assert!(store.persist_to(&BrokenStorage).await.is_err());
  }

  #[tokio::test]
  async fn background_persistence_follows_sign_in_and_out() {
    let storage = Arc::new(MemoryStorage::default());
    let store = SessionStore::new();
    let task = store.spawn_persistence(storage.clone());

    store.set_user(fields(&[Role::student()]));
    for _ in 0..50 {
      if storage.load_now().is_some() {
        break;
      }
      tokio::task::yield_now().await;
    }
    assert_eq!(
      storage.load_now().and_then(|s| s.active_role),
      Some(Role::student())
    );

    store.clear_user();
    for _ in 0..50 {
      if storage.load_now().is_none() {
        break;
      }
      tokio::task::yield_now().await;
    }
    assert!(storage.load_now().is_none());

    drop(store);
    task.await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn wait_until_times_out() {
    let store = SessionStore::new();
    let err = store
      .wait_until(Duration::from_secs(2), |s| s.ready)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
  }
}
