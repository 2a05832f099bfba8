//! [`IdentitySynchronizer`] — keeps the [`SessionStore`] consistent with the
//! identity and data providers.
//!
//! # Event handling
//!
//! | Event | Effect | Visible |
//! |-------|--------|---------|
//! | `SignedOut` | clear the snapshot immediately | yes |
//! | `SignedIn`, `UserUpdated`, `InitialSession` | fetch profile + roles, replace snapshot | yes |
//! | `TokenRefreshed` | fetch profile + roles, replace snapshot | no |
//! | `PasswordRecovery` | ignored | – |
//! | focus / visibility | re-fetch for the current session, collapsed while in flight | no |
//!
//! *Visible* resolutions raise the loading flag and hold `ready` down until
//! every visible resolution has settled.
//!
//! # Ordering
//!
//! Every resolution takes a ticket `(epoch, seq)` when it is issued. A
//! sign-out bumps the epoch; a result is written only if its epoch is still
//! current and its `seq` is newer than the last one written. A slow fetch
//! that completes after a sign-out is therefore discarded instead of bringing
//! the signed-out user back.
//!
//! A failed fetch never clears a present snapshot: transient provider
//! trouble must not log anyone out.

use std::{
  sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
  time::Duration,
};

use aula_core::{
  Result,
  event::{AuthEvent, AuthEventKind, SessionUser},
  principal::UserFields,
  provider::{DirectoryStore, IdentityProvider},
  role::Role,
};
use tokio::{
  sync::broadcast::error::RecvError,
  task::{AbortHandle, JoinHandle},
};

use crate::{store::SessionStore, timeout::with_timeout};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
  /// Deadline for every call to the identity or data provider.
  pub request_timeout: Duration,
  /// Delay between a focus event and the revalidation it triggers.
  pub focus_debounce:  Duration,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      request_timeout: Duration::from_secs(15),
      focus_debounce:  Duration::from_millis(60),
    }
  }
}

// ─── Bookkeeping ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
  Visible,
  Silent,
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
  epoch: u64,
  seq:   u64,
}

#[derive(Debug, Default)]
struct Generation {
  epoch:       u64,
  applied_seq: u64,
}

// ─── Synchronizer ────────────────────────────────────────────────────────────

/// Translates identity lifecycle events into [`SessionStore`] updates.
///
/// Construct once per process and share through an `Arc`; [`spawn`] starts
/// the coordinating task that consumes the provider's event stream.
///
/// [`spawn`]: IdentitySynchronizer::spawn
pub struct IdentitySynchronizer<I, D> {
  identity:        Arc<I>,
  directory:       Arc<D>,
  store:           SessionStore,
  config:          SyncConfig,
  alive:           AtomicBool,
  next_seq:        AtomicU64,
  generation:      Mutex<Generation>,
  /// Visible resolutions in flight.
  pending:         Mutex<usize>,
  focus_in_flight: AtomicBool,
  coordinator:     Mutex<Option<AbortHandle>>,
}

impl<I, D> IdentitySynchronizer<I, D>
where
  I: IdentityProvider + 'static,
  D: DirectoryStore + 'static,
{
  pub fn new(
    identity: Arc<I>,
    directory: Arc<D>,
    store: SessionStore,
    config: SyncConfig,
  ) -> Self {
    Self {
      identity,
      directory,
      store,
      config,
      alive: AtomicBool::new(true),
      next_seq: AtomicU64::new(0),
      generation: Mutex::new(Generation::default()),
      pending: Mutex::new(0),
      focus_in_flight: AtomicBool::new(false),
      coordinator: Mutex::new(None),
    }
  }

  pub fn store(&self) -> &SessionStore { &self.store }

  pub fn is_alive(&self) -> bool { self.alive.load(Ordering::SeqCst) }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  /// Subscribe to the provider's events, resolve the current session, then
  /// apply events in arrival order until the stream closes or
  /// [`shutdown`](Self::shutdown) is called.
  pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
    // Subscribe before bootstrapping so nothing emitted meanwhile is lost.
    let mut events = self.identity.subscribe();
    let this = Arc::clone(self);

    let handle = tokio::spawn(async move {
      this.bootstrap().await;
      loop {
        match events.recv().await {
          Ok(event) => {
            if !this.is_alive() {
              break;
            }
            this.dispatch(event);
          }
          Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "identity events lagged; resynchronising");
            this.bootstrap().await;
          }
          Err(RecvError::Closed) => {
            tracing::debug!("identity event stream closed");
            break;
          }
        }
      }
    });

    *lock(&self.coordinator) = Some(handle.abort_handle());
    handle
  }

  /// Tear down: no snapshot write happens after this returns, whatever is
  /// still in flight.
  pub fn shutdown(&self) {
    self.alive.store(false, Ordering::SeqCst);
    if let Some(handle) = lock(&self.coordinator).take() {
      handle.abort();
    }
    tracing::debug!("identity synchronizer stopped");
  }

  /// Visible resolution of whatever session the identity provider holds.
  ///
  /// No session clears the snapshot. If the lookup itself fails, a present
  /// user is kept and an unresolved one is cleared so the UI cannot wait
  /// forever.
  pub async fn bootstrap(&self) {
    let ticket = self.ticket();
    self.begin_op();

    let session = with_timeout(
      "current_session",
      self.config.request_timeout,
      self.identity.current_session(),
    )
    .await;

    match session {
      Ok(Some(session)) => match self.fetch_identity(&session.user).await {
        Ok(fields) => {
          self.apply(ticket, fields);
        }
        Err(e) => {
          tracing::warn!(error = %e, principal = %session.user.id, "bootstrap identity fetch failed");
          self.clear_unresolved(ticket);
        }
      },
      Ok(None) => self.clear(ticket),
      Err(e) => {
        tracing::warn!(error = %e, "bootstrap session lookup failed");
        self.clear_unresolved(ticket);
      }
    }

    self.end_op();
  }

  // ── Events ────────────────────────────────────────────────────────────────

  /// Apply one lifecycle event.
  ///
  /// Sign-out takes effect before this returns. Fetching events spawn a
  /// resolution task whose handle is returned; its ticket is taken now, so
  /// ordering follows event arrival rather than fetch completion.
  pub fn dispatch(self: &Arc<Self>, event: AuthEvent) -> Option<JoinHandle<()>> {
    tracing::debug!(kind = %event.kind, principal = ?event.session.as_ref().map(|u| u.id), "identity event");
    match event.kind {
      AuthEventKind::SignedOut => {
        self.sign_out();
        None
      }
      AuthEventKind::SignedIn
      | AuthEventKind::UserUpdated
      | AuthEventKind::InitialSession => event
        .session
        .map(|user| self.spawn_resolution(user, Visibility::Visible)),
      AuthEventKind::TokenRefreshed => event
        .session
        .map(|user| self.spawn_resolution(user, Visibility::Silent)),
      AuthEventKind::PasswordRecovery => None,
    }
  }

  /// The window gained focus or became visible: silently revalidate the
  /// current session. Focus events arriving while one revalidation is
  /// pending collapse into it.
  pub fn notify_focus(self: &Arc<Self>) -> Option<JoinHandle<()>> {
    if !self.is_alive() || self.focus_in_flight.swap(true, Ordering::SeqCst) {
      return None;
    }
    let this = Arc::clone(self);
    Some(tokio::spawn(async move {
      tokio::time::sleep(this.config.focus_debounce).await;
      if this.is_alive() {
        this.revalidate().await;
      }
      this.focus_in_flight.store(false, Ordering::SeqCst);
    }))
  }

  fn sign_out(&self) {
    self.begin_op();
    {
      let mut generation = lock(&self.generation);
      generation.epoch += 1;
      if self.is_alive() {
        self.store.clear_user();
      }
    }
    self.end_op();
  }

  fn spawn_resolution(
    self: &Arc<Self>,
    user: SessionUser,
    visibility: Visibility,
  ) -> JoinHandle<()> {
    let ticket = self.ticket();
    if visibility == Visibility::Visible {
      self.begin_op();
    }
    let this = Arc::clone(self);
    tokio::spawn(async move {
      match this.fetch_identity(&user).await {
        Ok(fields) => {
          this.apply(ticket, fields);
        }
        Err(e) => {
          tracing::warn!(error = %e, principal = %user.id, "identity resolution failed; keeping last known snapshot");
        }
      }
      if visibility == Visibility::Visible {
        this.end_op();
      }
    })
  }

  /// Silent re-fetch for the current session. A missing session is left
  /// alone: an authoritative sign-out arrives as its own event.
  async fn revalidate(&self) {
    let ticket = self.ticket();
    let session = with_timeout(
      "current_session",
      self.config.request_timeout,
      self.identity.current_session(),
    )
    .await;

    match session {
      Ok(Some(session)) => match self.fetch_identity(&session.user).await {
        Ok(fields) => {
          self.apply(ticket, fields);
        }
        Err(e) => tracing::debug!(error = %e, "focus revalidation failed"),
      },
      Ok(None) => {}
      Err(e) => tracing::debug!(error = %e, "focus revalidation failed"),
    }
  }

  // ── Fetching ──────────────────────────────────────────────────────────────

  /// Fetch the profile and role rows concurrently and normalise them.
  async fn fetch_identity(&self, user: &SessionUser) -> Result<UserFields> {
    let timeout = self.config.request_timeout;
    let (profile, rows) = tokio::try_join!(
      with_timeout("fetch_profile", timeout, self.directory.fetch_profile(user.id)),
      with_timeout(
        "fetch_role_assignments",
        timeout,
        self.directory.fetch_role_assignments(user.id),
      ),
    )?;

    // Rows with a blank tag predate role tagging and denote students.
    let roles: Vec<Role> = rows
      .iter()
      .map(|row| Role::new(&row.role).unwrap_or_else(|_| Role::student()))
      .collect();

    let email = profile
      .as_ref()
      .map(|p| p.email.clone())
      .or_else(|| user.email.clone())
      .unwrap_or_default();

    Ok(UserFields {
      id: user.id,
      email,
      display_name: profile.as_ref().and_then(|p| p.display_name.clone()),
      status: profile.map(|p| p.status).unwrap_or_default(),
      roles,
      legacy_role: None,
    })
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  fn ticket(&self) -> Ticket {
    let epoch = lock(&self.generation).epoch;
    Ticket {
      epoch,
      seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
    }
  }

  /// Claim the write slot for `ticket`, or `None` if it has been overtaken.
  fn claim(&self, ticket: Ticket) -> Option<MutexGuard<'_, Generation>> {
    if !self.is_alive() {
      return None;
    }
    let mut generation = lock(&self.generation);
    if generation.epoch != ticket.epoch || ticket.seq <= generation.applied_seq {
      tracing::debug!(
        epoch = ticket.epoch,
        seq = ticket.seq,
        current_epoch = generation.epoch,
        applied_seq = generation.applied_seq,
        "discarding stale identity resolution"
      );
      return None;
    }
    generation.applied_seq = ticket.seq;
    Some(generation)
  }

  fn apply(&self, ticket: Ticket, fields: UserFields) -> bool {
    let Some(_slot) = self.claim(ticket) else {
      return false;
    };
    tracing::debug!(principal = %fields.id, roles = fields.roles.len(), "identity resolved");
    self.store.set_user(fields);
    true
  }

  fn clear(&self, ticket: Ticket) {
    if let Some(_slot) = self.claim(ticket) {
      self.store.clear_user();
    }
  }

  fn clear_unresolved(&self, ticket: Ticket) {
    if self.store.principal().is_some() {
      return;
    }
    self.clear(ticket);
  }

  fn begin_op(&self) {
    let mut pending = lock(&self.pending);
    *pending += 1;
    if *pending == 1 && self.is_alive() {
      self.store.set_ready(false);
      self.store.start_auth_loading();
    }
  }

  fn end_op(&self) {
    let mut pending = lock(&self.pending);
    *pending = pending.saturating_sub(1);
    if *pending == 0 && self.is_alive() {
      self.store.stop_auth_loading();
      self.store.set_ready(true);
    }
  }
}

/// Lock ignoring poison: every critical section here leaves the guarded
/// value consistent even if a panic unwinds through it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
