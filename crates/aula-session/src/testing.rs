//! Scriptable identity and data providers for the session tests.

use std::{
  collections::HashMap,
  sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use aula_core::{
  Error,
  event::{AuthEvent, AuthSession, SessionUser},
  principal::AccountStatus,
  provider::{DirectoryStore, IdentityProvider, NewProfile, Profile, RoleAssignment},
  role::Role,
};
use chrono::{Duration, Utc};
use tokio::sync::{Semaphore, broadcast};
use uuid::Uuid;

// ─── Identity ────────────────────────────────────────────────────────────────

pub struct MockIdentity {
  events:        broadcast::Sender<AuthEvent>,
  session:       Mutex<Option<AuthSession>>,
  pub fail_lookup: AtomicBool,
}

impl MockIdentity {
  pub fn new() -> Self { Self::with_capacity(16) }

  pub fn with_capacity(capacity: usize) -> Self {
    let (events, _) = broadcast::channel(capacity);
    Self {
      events,
      session: Mutex::new(None),
      fail_lookup: AtomicBool::new(false),
    }
  }

  pub fn set_session(&self, user: Option<(Uuid, &str)>) {
    *self.session.lock().unwrap() = user.map(|(id, email)| AuthSession {
      user:         SessionUser {
        id,
        email: Some(email.to_owned()),
      },
      access_token: format!("token-{id}"),
      expires_at:   Utc::now() + Duration::hours(1),
    });
  }

  pub fn emit(&self, event: AuthEvent) {
    let _ = self.events.send(event);
  }
}

impl IdentityProvider for MockIdentity {
  type Error = Error;

  async fn sign_in_with_password(&self, _: &str, _: &str) -> Result<AuthSession, Error> {
    unimplemented!()
  }

  async fn sign_out(&self) -> Result<(), Error> { unimplemented!() }

  async fn current_session(&self) -> Result<Option<AuthSession>, Error> {
    if self.fail_lookup.load(Ordering::SeqCst) {
      return Err(Error::Backend("session lookup failed".into()));
    }
    Ok(self.session.lock().unwrap().clone())
  }

  async fn request_password_reset(&self, _: &str) -> Result<(), Error> { unimplemented!() }

  async fn update_password(&self, _: &str) -> Result<(), Error> { unimplemented!() }

  async fn sign_up(&self, _: &str, _: &str, _: Option<&str>) -> Result<SessionUser, Error> {
    unimplemented!()
  }

  async fn complete_password_reset(&self, _: &str, _: &str) -> Result<Uuid, Error> {
    unimplemented!()
  }

  fn subscribe(&self) -> broadcast::Receiver<AuthEvent> { self.events.subscribe() }
}

// ─── Directory ───────────────────────────────────────────────────────────────

/// Serves profiles and role rows from memory. Role lookups can be held back
/// (`hold_roles`) until permits are released, or made to hang or fail.
pub struct MockDirectory {
  profiles:       Mutex<HashMap<Uuid, Profile>>,
  roles:          Mutex<HashMap<Uuid, Vec<String>>>,
  gate:           Semaphore,
  held:           AtomicBool,
  pub hang:       AtomicBool,
  pub fail:       AtomicBool,
  pub role_calls: AtomicUsize,
}

impl MockDirectory {
  pub fn new() -> Self {
    Self {
      profiles:   Mutex::new(HashMap::new()),
      roles:      Mutex::new(HashMap::new()),
      gate:       Semaphore::new(0),
      held:       AtomicBool::new(false),
      hang:       AtomicBool::new(false),
      fail:       AtomicBool::new(false),
      role_calls: AtomicUsize::new(0),
    }
  }

  pub fn put(&self, id: Uuid, email: &str, roles: &[&str]) {
    self.profiles.lock().unwrap().insert(id, Profile {
      id,
      email: email.to_owned(),
      display_name: Some(format!("User {email}")),
      status: AccountStatus::Active,
      created_at: Utc::now(),
    });
    self
      .roles
      .lock()
      .unwrap()
      .insert(id, roles.iter().map(|r| (*r).to_owned()).collect());
  }

  pub fn set_profile_status(&self, id: Uuid, status: AccountStatus) {
    if let Some(p) = self.profiles.lock().unwrap().get_mut(&id) {
      p.status = status;
    }
  }

  /// Make every role lookup wait for a [`MockDirectory::release`].
  pub fn hold_roles(&self) { self.held.store(true, Ordering::SeqCst); }

  pub fn release(&self, n: usize) { self.gate.add_permits(n); }
}

impl DirectoryStore for MockDirectory {
  type Error = Error;

  async fn fetch_profile(&self, id: Uuid) -> Result<Option<Profile>, Error> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(Error::Backend("profile lookup failed".into()));
    }
    if self.hang.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    Ok(self.profiles.lock().unwrap().get(&id).cloned())
  }

  async fn fetch_role_assignments(&self, id: Uuid) -> Result<Vec<RoleAssignment>, Error> {
    self.role_calls.fetch_add(1, Ordering::SeqCst);
    if self.held.load(Ordering::SeqCst) {
      self
        .gate
        .acquire()
        .await
        .map_err(|e| Error::Backend(Box::new(e)))?
        .forget();
    }
    if self.fail.load(Ordering::SeqCst) {
      return Err(Error::Backend("role lookup failed".into()));
    }
    let rows = self.roles.lock().unwrap().get(&id).cloned().unwrap_or_default();
    Ok(
      rows
        .into_iter()
        .map(|role| RoleAssignment {
          principal_id: id,
          role,
          assigned_at: Utc::now(),
        })
        .collect(),
    )
  }

  async fn list_by_role(&self, _: &Role, _: Option<&str>) -> Result<Vec<Profile>, Error> {
    unimplemented!()
  }

  async fn create_profile(&self, _: Uuid, _: NewProfile) -> Result<Profile, Error> {
    unimplemented!()
  }

  async fn assign_roles(&self, _: Uuid, _: Uuid, _: &[Role]) -> Result<(), Error> {
    unimplemented!()
  }

  async fn add_role(&self, _: Uuid, _: Uuid, _: &Role) -> Result<(), Error> { unimplemented!() }

  async fn remove_role(&self, _: Uuid, _: Uuid, _: &Role) -> Result<(), Error> {
    unimplemented!()
  }

  async fn set_status(&self, _: Uuid, _: Uuid, _: AccountStatus) -> Result<(), Error> {
    unimplemented!()
  }

  async fn toggle_dropped(&self, _: Uuid, _: Uuid) -> Result<AccountStatus, Error> {
    unimplemented!()
  }
}
