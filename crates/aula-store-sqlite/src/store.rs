//! [`SqliteBackend`] — the SQLite implementation of [`IdentityProvider`],
//! [`DirectoryStore`] and [`SnapshotStorage`].

use std::{
  path::Path,
  sync::{Arc, Mutex, MutexGuard},
  time::Duration,
};

use aula_core::{
  event::{AuthEvent, AuthEventKind, AuthSession, SessionUser},
  principal::AccountStatus,
  provider::{
    DirectoryStore, IdentityProvider, NewProfile, Profile, RoleAssignment, SnapshotStorage,
  },
  role::Role,
  snapshot::PersistedSnapshot,
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tokio::{
  sync::broadcast,
  task::AbortHandle,
  time::MissedTickBehavior,
};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    PROFILE_COLUMNS, RawProfile, RawRoleAssignment, decode_status, decode_uuid, encode_dt,
    encode_status, encode_uuid,
  },
  schema::SCHEMA,
  secret::{digest_token, hash_password, new_token, verify_password},
};

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BackendSettings {
  /// Lifetime of an access token; refreshed sessions get a fresh one.
  pub session_ttl:     chrono::Duration,
  /// Lifetime of a password reset token.
  pub reset_token_ttl: chrono::Duration,
  /// Row key the persisted snapshot is stored under.
  pub snapshot_key:    String,
  /// Capacity of the lifecycle event channel.
  pub event_capacity:  usize,
}

impl Default for BackendSettings {
  fn default() -> Self {
    Self {
      session_ttl:     chrono::Duration::hours(1),
      reset_token_ttl: chrono::Duration::hours(1),
      snapshot_key:    "aula.session".to_owned(),
      event_capacity:  64,
    }
  }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// An Aula backend over a single SQLite file.
///
/// Cloning is cheap; clones share the connection, the current session and
/// the event channel.
#[derive(Clone)]
pub struct SqliteBackend {
  conn:      tokio_rusqlite::Connection,
  settings:  Arc<BackendSettings>,
  session:   Arc<Mutex<Option<AuthSession>>>,
  events:    broadcast::Sender<AuthEvent>,
  refresher: Arc<Mutex<Option<AbortHandle>>>,
}

impl SqliteBackend {
  /// Open (or create) a backend at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, settings: BackendSettings) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, settings).await
  }

  /// Open an in-memory backend — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(BackendSettings::default()).await
  }

  pub async fn open_in_memory_with(settings: BackendSettings) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, settings).await
  }

  async fn init(conn: tokio_rusqlite::Connection, settings: BackendSettings) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    let (events, _) = broadcast::channel(settings.event_capacity.max(1));
    Ok(Self {
      conn,
      settings: Arc::new(settings),
      session: Arc::new(Mutex::new(None)),
      events,
      refresher: Arc::new(Mutex::new(None)),
    })
  }

  pub fn settings(&self) -> &BackendSettings { &self.settings }

  fn emit(&self, kind: AuthEventKind, user: Option<SessionUser>) {
    tracing::debug!(%kind, principal = ?user.as_ref().map(|u| u.id), "emitting identity event");
    // No receivers is fine: nobody is listening yet.
    let _ = self.events.send(AuthEvent::new(kind, user));
  }

  fn session_slot(&self) -> MutexGuard<'_, Option<AuthSession>> {
    self.session.lock().unwrap_or_else(|p| p.into_inner())
  }

  fn issue_session(&self, user: SessionUser) -> AuthSession {
    AuthSession {
      user,
      access_token: new_token(),
      expires_at: Utc::now() + self.settings.session_ttl,
    }
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  /// Re-issue the current session's access token and announce it with
  /// `TokenRefreshed`. Returns `None` when nobody is signed in.
  pub fn refresh_session(&self) -> Option<AuthSession> {
    let refreshed = {
      let mut slot = self.session_slot();
      let user = slot.as_ref()?.user.clone();
      let session = self.issue_session(user);
      *slot = Some(session.clone());
      session
    };
    self.emit(AuthEventKind::TokenRefreshed, Some(refreshed.user.clone()));
    Some(refreshed)
  }

  /// Start the background token refresher, ticking every `every`. Only one
  /// refresher ever runs per backend; later calls return `false` and change
  /// nothing.
  pub fn enable_auto_refresh(&self, every: Duration) -> bool {
    let mut slot = self.refresher.lock().unwrap_or_else(|p| p.into_inner());
    if slot.is_some() {
      return false;
    }
    let backend = self.clone();
    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if backend.refresh_session().is_some() {
          tracing::debug!("access token refreshed");
        }
      }
    });
    *slot = Some(task.abort_handle());
    tracing::info!(?every, "automatic token refresh enabled");
    true
  }

  pub fn disable_auto_refresh(&self) {
    let handle = self.refresher.lock().unwrap_or_else(|p| p.into_inner()).take();
    if let Some(handle) = handle {
      handle.abort();
    }
  }

  // ── Seeding ───────────────────────────────────────────────────────────────

  /// Create a principal with credentials and roles, without any actor
  /// check. Backs self-service sign-up (no roles) and provisioning of the
  /// first administrator.
  pub async fn register_user(
    &self,
    email: &str,
    password: &str,
    display_name: Option<&str>,
    roles: &[Role],
  ) -> Result<Profile> {
    let profile = Profile {
      id:           Uuid::new_v4(),
      email:        email.trim().to_owned(),
      display_name: display_name.map(str::to_owned),
      status:       AccountStatus::Active,
      created_at:   Utc::now(),
    };
    let hash = hash_password(password)?;

    let id_str = encode_uuid(profile.id);
    let email_str = profile.email.clone();
    let name = profile.display_name.clone();
    let status = encode_status(profile.status);
    let at_str = encode_dt(profile.created_at);
    let tags: Vec<String> = roles.iter().map(|r| r.as_str().to_owned()).collect();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let taken = tx
          .query_row(
            "SELECT 1 FROM profiles WHERE email = ?1",
            rusqlite::params![email_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO profiles (id, email, display_name, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, email_str, name, status, at_str],
        )?;
        tx.execute(
          "INSERT INTO credentials (principal_id, password_hash, updated_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, hash, at_str],
        )?;
        for tag in &tags {
          tx.execute(
            "INSERT OR IGNORE INTO role_assignments (principal_id, role, assigned_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, tag, at_str],
          )?;
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::EmailTaken(profile.email));
    }
    tracing::info!(principal = %profile.id, email = %profile.email, roles = roles.len(), "registered user");
    Ok(profile)
  }

  // ── Password reset ────────────────────────────────────────────────────────

  /// Issue a single-use reset token for `email`. Returns `None` for unknown
  /// addresses. Only the token's digest is stored.
  pub async fn issue_reset_token(&self, email: &str) -> Result<Option<String>> {
    let Some(principal) = self.profile_by_email(email).await? else {
      return Ok(None);
    };
    let token = new_token();
    let digest = digest_token(&token);
    let id_str = encode_uuid(principal.id);
    let expires = encode_dt(Utc::now() + self.settings.reset_token_ttl);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO password_resets (token_digest, principal_id, expires_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![digest, id_str, expires],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(principal = %principal.id, "password reset token issued");
    Ok(Some(token))
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
    let email = email.trim().to_owned();
    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = ?1"),
              rusqlite::params![email],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawProfile::into_profile).transpose()
  }

  async fn require_admin(&self, actor: Uuid, action: &'static str) -> Result<()> {
    let actor_str = encode_uuid(actor);
    let tags: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT role FROM role_assignments WHERE principal_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![actor_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    let admin = Role::admin();
    if tags.iter().any(|t| Role::new(t).is_ok_and(|r| r == admin)) {
      Ok(())
    } else {
      tracing::warn!(%actor, action, "write rejected: actor is not an administrator");
      Err(Error::PermissionDenied { actor, action })
    }
  }

  async fn require_principal(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM profiles WHERE id = ?1",
              rusqlite::params![id_str],
              |_| Ok(()),
            )
            .optional()?
            .is_some(),
        )
      })
      .await?;
    if exists { Ok(()) } else { Err(Error::PrincipalNotFound(id)) }
  }

  /// A write touched `principal_id`; if that is who is signed in, tell the
  /// synchroniser to re-read them.
  fn announce_change(&self, principal_id: Uuid) {
    let user = self
      .session_slot()
      .as_ref()
      .filter(|s| s.user.id == principal_id)
      .map(|s| s.user.clone());
    if user.is_some() {
      self.emit(AuthEventKind::UserUpdated, user);
    }
  }
}

// ─── IdentityProvider impl ───────────────────────────────────────────────────

impl IdentityProvider for SqliteBackend {
  type Error = Error;

  async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
    let email = email.trim().to_owned();
    let row: Option<(String, String, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT p.id, p.email, c.password_hash
               FROM profiles p
               JOIN credentials c ON c.principal_id = p.id
               WHERE p.email = ?1",
              rusqlite::params![email],
              |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?,
        )
      })
      .await?;

    let Some((id, email, phc)) = row else {
      tracing::info!("sign-in rejected: unknown email");
      return Err(Error::InvalidCredentials);
    };
    if !verify_password(password, &phc) {
      tracing::info!(principal = %id, "sign-in rejected: wrong password");
      return Err(Error::InvalidCredentials);
    }

    let user = SessionUser {
      id:    decode_uuid(&id)?,
      email: Some(email),
    };
    let session = self.issue_session(user.clone());
    *self.session_slot() = Some(session.clone());
    tracing::info!(principal = %user.id, "signed in");
    self.emit(AuthEventKind::SignedIn, Some(user));
    Ok(session)
  }

  async fn sign_out(&self) -> Result<()> {
    let previous = self.session_slot().take();
    if let Some(session) = previous {
      tracing::info!(principal = %session.user.id, "signed out");
    }
    // Announced even without a session; a sign-out is always authoritative.
    self.emit(AuthEventKind::SignedOut, None);
    Ok(())
  }

  async fn current_session(&self) -> Result<Option<AuthSession>> {
    let expired = {
      let mut slot = self.session_slot();
      if !slot.as_ref().is_some_and(|s| s.expires_at <= Utc::now()) {
        return Ok(slot.clone());
      }
      slot.take()
    };
    if let Some(session) = expired {
      tracing::info!(principal = %session.user.id, "session expired");
      self.emit(AuthEventKind::SignedOut, None);
    }
    Ok(None)
  }

  async fn request_password_reset(&self, email: &str) -> Result<()> {
    // Delivery of the token is not this backend's concern; operators issue
    // tokens directly with `issue_reset_token`.
    if self.issue_reset_token(email).await?.is_none() {
      tracing::debug!("password reset requested for unknown email");
    }
    Ok(())
  }

  async fn update_password(&self, new_password: &str) -> Result<()> {
    let user = self
      .session_slot()
      .as_ref()
      .map(|s| s.user.clone())
      .ok_or(Error::NoSession)?;
    let hash = hash_password(new_password)?;
    let id_str = encode_uuid(user.id);
    let now = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO credentials (principal_id, password_hash, updated_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(principal_id) DO UPDATE
             SET password_hash = excluded.password_hash, updated_at = excluded.updated_at",
          rusqlite::params![id_str, hash, now],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(principal = %user.id, "password updated");
    self.emit(AuthEventKind::UserUpdated, Some(user));
    Ok(())
  }

  async fn sign_up(
    &self,
    email: &str,
    password: &str,
    display_name: Option<&str>,
  ) -> Result<SessionUser> {
    let profile = self.register_user(email, password, display_name, &[]).await?;
    Ok(SessionUser {
      id:    profile.id,
      email: Some(profile.email),
    })
  }

  /// Redeem a reset token: set the new password and announce
  /// `PasswordRecovery`. The token cannot be used again.
  async fn complete_password_reset(&self, token: &str, new_password: &str) -> Result<Uuid> {
    let digest = digest_token(token);
    let hash = hash_password(new_password)?;
    let now = encode_dt(Utc::now());

    let redeemed: Option<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let principal: Option<String> = tx
          .query_row(
            "SELECT principal_id FROM password_resets
             WHERE token_digest = ?1 AND used_at IS NULL AND expires_at > ?2",
            rusqlite::params![digest, now],
            |r| r.get(0),
          )
          .optional()?;
        let Some(principal) = principal else {
          return Ok(None);
        };
        tx.execute(
          "UPDATE password_resets SET used_at = ?2 WHERE token_digest = ?1",
          rusqlite::params![digest, now],
        )?;
        tx.execute(
          "UPDATE credentials SET password_hash = ?2, updated_at = ?3 WHERE principal_id = ?1",
          rusqlite::params![principal, hash, now],
        )?;
        tx.commit()?;
        Ok(Some(principal))
      })
      .await?;

    let id = decode_uuid(&redeemed.ok_or(Error::InvalidResetToken)?)?;
    tracing::info!(principal = %id, "password reset completed");
    self.emit(AuthEventKind::PasswordRecovery, Some(SessionUser { id, email: None }));
    Ok(id)
  }

  fn subscribe(&self) -> broadcast::Receiver<AuthEvent> { self.events.subscribe() }
}

// ─── DirectoryStore impl ─────────────────────────────────────────────────────

impl DirectoryStore for SqliteBackend {
  type Error = Error;

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn fetch_profile(&self, id: Uuid) -> Result<Option<Profile>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
              rusqlite::params![id_str],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawProfile::into_profile).transpose()
  }

  async fn fetch_role_assignments(&self, principal_id: Uuid) -> Result<Vec<RoleAssignment>> {
    let id_str = encode_uuid(principal_id);
    let raws: Vec<RawRoleAssignment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT principal_id, role, assigned_at FROM role_assignments
           WHERE principal_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawRoleAssignment {
              principal_id: row.get(0)?,
              role:         row.get(1)?,
              assigned_at:  row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRoleAssignment::into_assignment).collect()
  }

  async fn list_by_role(&self, role: &Role, search: Option<&str>) -> Result<Vec<Profile>> {
    let tag = role.as_str().to_owned();
    let pattern = search
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(|s| format!("%{}%", s.to_lowercase()));

    let raws: Vec<RawProfile> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT p.id, p.email, p.display_name, p.status, p.created_at
           FROM profiles p
           JOIN role_assignments r ON r.principal_id = p.id
           WHERE lower(trim(r.role)) = ?1
             AND (?2 IS NULL
                  OR lower(p.email) LIKE ?2
                  OR lower(coalesce(p.display_name, '')) LIKE ?2)
           ORDER BY lower(coalesce(p.display_name, p.email))",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tag, pattern], RawProfile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProfile::into_profile).collect()
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn create_profile(&self, actor: Uuid, input: NewProfile) -> Result<Profile> {
    self.require_admin(actor, "create profiles").await?;

    let profile = Profile {
      id:           Uuid::new_v4(),
      email:        input.email.trim().to_owned(),
      display_name: input.display_name,
      status:       input.status,
      created_at:   Utc::now(),
    };
    let id_str = encode_uuid(profile.id);
    let email = profile.email.clone();
    let name = profile.display_name.clone();
    let status = encode_status(profile.status);
    let at_str = encode_dt(profile.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO profiles (id, email, display_name, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, email, name, status, at_str],
        )?;
        Ok(n == 1)
      })
      .await?;

    if !inserted {
      return Err(Error::EmailTaken(profile.email));
    }
    tracing::info!(%actor, principal = %profile.id, "profile created");
    Ok(profile)
  }

  async fn assign_roles(&self, actor: Uuid, principal_id: Uuid, roles: &[Role]) -> Result<()> {
    self.require_admin(actor, "assign roles").await?;
    self.require_principal(principal_id).await?;

    let id_str = encode_uuid(principal_id);
    let at_str = encode_dt(Utc::now());
    let tags: Vec<String> = roles.iter().map(|r| r.as_str().to_owned()).collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM role_assignments WHERE principal_id = ?1",
          rusqlite::params![id_str],
        )?;
        for tag in &tags {
          tx.execute(
            "INSERT OR IGNORE INTO role_assignments (principal_id, role, assigned_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, tag, at_str],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::info!(%actor, principal = %principal_id, roles = roles.len(), "roles replaced");
    self.announce_change(principal_id);
    Ok(())
  }

  async fn add_role(&self, actor: Uuid, principal_id: Uuid, role: &Role) -> Result<()> {
    self.require_admin(actor, "assign roles").await?;
    self.require_principal(principal_id).await?;

    let id_str = encode_uuid(principal_id);
    let tag = role.as_str().to_owned();
    let at_str = encode_dt(Utc::now());
    let added = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO role_assignments (principal_id, role, assigned_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, tag, at_str],
        )?;
        Ok(n == 1)
      })
      .await?;

    if added {
      tracing::info!(%actor, principal = %principal_id, %role, "role added");
      self.announce_change(principal_id);
    }
    Ok(())
  }

  async fn remove_role(&self, actor: Uuid, principal_id: Uuid, role: &Role) -> Result<()> {
    self.require_admin(actor, "revoke roles").await?;

    let id_str = encode_uuid(principal_id);
    let tag = role.as_str().to_owned();
    let removed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "DELETE FROM role_assignments WHERE principal_id = ?1 AND lower(trim(role)) = ?2",
          rusqlite::params![id_str, tag],
        )?;
        Ok(n > 0)
      })
      .await?;

    if removed {
      tracing::info!(%actor, principal = %principal_id, %role, "role removed");
      self.announce_change(principal_id);
    }
    Ok(())
  }

  async fn set_status(&self, actor: Uuid, principal_id: Uuid, status: AccountStatus) -> Result<()> {
    self.require_admin(actor, "change account status").await?;

    let id_str = encode_uuid(principal_id);
    let updated = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE profiles SET status = ?2 WHERE id = ?1",
          rusqlite::params![id_str, encode_status(status)],
        )?;
        Ok(n == 1)
      })
      .await?;

    if !updated {
      return Err(Error::PrincipalNotFound(principal_id));
    }
    tracing::info!(%actor, principal = %principal_id, %status, "status changed");
    self.announce_change(principal_id);
    Ok(())
  }

  async fn toggle_dropped(&self, actor: Uuid, principal_id: Uuid) -> Result<AccountStatus> {
    self.require_admin(actor, "change account status").await?;

    let id_str = encode_uuid(principal_id);
    let next: Option<AccountStatus> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current: Option<Option<String>> = tx
          .query_row(
            "SELECT status FROM profiles WHERE id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(current) = current else {
          return Ok(None);
        };
        let next = match decode_status(current.as_deref()) {
          AccountStatus::Dropped => AccountStatus::Active,
          _ => AccountStatus::Dropped,
        };
        tx.execute(
          "UPDATE profiles SET status = ?2 WHERE id = ?1",
          rusqlite::params![id_str, encode_status(next)],
        )?;
        tx.commit()?;
        Ok(Some(next))
      })
      .await?;

    let next = next.ok_or(Error::PrincipalNotFound(principal_id))?;
    tracing::info!(%actor, principal = %principal_id, status = %next, "dropped flag toggled");
    self.announce_change(principal_id);
    Ok(next)
  }
}

// ─── SnapshotStorage impl ────────────────────────────────────────────────────

impl SnapshotStorage for SqliteBackend {
  type Error = Error;

  async fn load(&self) -> Result<Option<PersistedSnapshot>> {
    let key = self.settings.snapshot_key.clone();
    let body: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT body FROM snapshots WHERE key = ?1",
              rusqlite::params![key],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
  }

  async fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
    let key = self.settings.snapshot_key.clone();
    let body = serde_json::to_string(snapshot)?;
    let at_str = encode_dt(snapshot.saved_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO snapshots (key, body, saved_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(key) DO UPDATE SET body = excluded.body, saved_at = excluded.saved_at",
          rusqlite::params![key, body, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn clear(&self) -> Result<()> {
    let key = self.settings.snapshot_key.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM snapshots WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
