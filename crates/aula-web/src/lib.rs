//! View layer for Aula.
//!
//! Exposes an axum [`Router`] whose role areas (`/admin`, `/teacher`,
//! `/student`, `/coordinator`) are guarded by an [`AccessGate`] built per
//! request, plus sign-up, sign-in, session and administration endpoints over
//! any [`Backend`].

pub mod error;
pub mod handlers;

pub use error::Error;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use aula_core::{
  policy::GuardPolicy,
  provider::{DirectoryStore, IdentityProvider},
  role::Role,
};
use aula_session::{AccessGate, IdentitySynchronizer, SessionStore, SyncConfig};
use aula_store_sqlite::{BackendSettings, SqliteBackend};
use axum::{
  Router,
  routing::{get, post, put},
};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tower_http::trace::TraceLayer;

use handlers::{admin, area, auth, session};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `aula.toml` and `AULA_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  pub request_timeout_secs: u64,
  pub focus_debounce_ms:    u64,
  pub token_refresh_secs:   u64,
  pub snapshot_key:         String,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      host:                 "127.0.0.1".to_owned(),
      port:                 8080,
      store_path:           PathBuf::from("aula.db"),
      request_timeout_secs: 15,
      focus_debounce_ms:    60,
      token_refresh_secs:   3000,
      snapshot_key:         "aula.session".to_owned(),
    }
  }
}

impl AppConfig {
  /// Layer an optional TOML file and `AULA_*` environment variables over the
  /// defaults.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("AULA"))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

  pub fn token_refresh(&self) -> Duration { Duration::from_secs(self.token_refresh_secs) }

  pub fn sync_config(&self) -> SyncConfig {
    SyncConfig {
      request_timeout: self.request_timeout(),
      focus_debounce:  Duration::from_millis(self.focus_debounce_ms),
    }
  }

  pub fn backend_settings(&self) -> BackendSettings {
    BackendSettings {
      snapshot_key: self.snapshot_key.clone(),
      ..BackendSettings::default()
    }
  }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// Everything the view layer needs from a backend.
pub trait Backend: IdentityProvider + DirectoryStore + 'static {}

impl<T> Backend for T where T: IdentityProvider + DirectoryStore + 'static {}

static BACKEND: OnceCell<Arc<SqliteBackend>> = OnceCell::const_new();

/// The process-wide SQLite backend, opened on first use. Later calls return
/// the same instance whatever `config` they pass, so only one token
/// refresher and one event channel ever exist.
pub async fn shared_backend(config: &AppConfig) -> aula_store_sqlite::Result<Arc<SqliteBackend>> {
  BACKEND
    .get_or_try_init(|| async {
      tracing::info!(path = ?config.store_path, "opening store");
      let backend = SqliteBackend::open(&config.store_path, config.backend_settings()).await?;
      Ok::<_, aula_store_sqlite::Error>(Arc::new(backend))
    })
    .await
    .cloned()
}

// ─── Areas ───────────────────────────────────────────────────────────────────

/// The guarded role areas and the policy each declares.
pub fn area_policies() -> Vec<(&'static str, GuardPolicy)> {
  vec![
    (
      "/admin",
      GuardPolicy::allow([Role::admin()]).with_fallback("Loading administration…"),
    ),
    ("/teacher", GuardPolicy::allow([Role::teacher()])),
    ("/student", GuardPolicy::allow([Role::student()])),
    ("/coordinator", GuardPolicy::allow([Role::coordinator()])),
  ]
}

/// The guarded areas. Every request is a fresh navigation, so each one gets
/// its own [`AccessGate`] built from the area's policy; a redirect latch
/// carried across requests would swallow later redirects.
pub struct Areas {
  policies: Vec<(&'static str, GuardPolicy)>,
}

impl Areas {
  pub fn new(policies: Vec<(&'static str, GuardPolicy)>) -> Self { Self { policies } }

  pub fn prefixes(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.policies.iter().map(|(prefix, _)| *prefix)
  }

  /// A gate for `path`, with the area prefix it matched.
  pub fn gate_for(&self, path: &str) -> Option<(&'static str, AccessGate)> {
    self.policies.iter().find_map(|(prefix, policy)| {
      let nested = path
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
      nested.then(|| (*prefix, AccessGate::new(policy.clone())))
    })
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<B> {
  pub backend: Arc<B>,
  pub store:   SessionStore,
  pub sync:    Arc<IdentitySynchronizer<B, B>>,
  pub areas:   Arc<Areas>,
  pub config:  Arc<AppConfig>,
}

impl<B> Clone for AppState<B> {
  fn clone(&self) -> Self {
    Self {
      backend: self.backend.clone(),
      store:   self.store.clone(),
      sync:    self.sync.clone(),
      areas:   self.areas.clone(),
      config:  self.config.clone(),
    }
  }
}

impl<B: Backend> AppState<B> {
  /// Wire a fresh session store and synchronizer around `backend`. Nothing
  /// runs until [`IdentitySynchronizer::spawn`] is called on `sync`.
  pub fn new(backend: Arc<B>, config: AppConfig) -> Self {
    let store = SessionStore::new();
    let sync = Arc::new(IdentitySynchronizer::new(
      backend.clone(),
      backend.clone(),
      store.clone(),
      config.sync_config(),
    ));
    Self {
      backend,
      store,
      sync,
      areas: Arc::new(Areas::new(area_policies())),
      config: Arc::new(config),
    }
  }

  pub fn request_timeout(&self) -> Duration { self.config.request_timeout() }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the application.
pub fn router<B: Backend>(state: AppState<B>) -> Router {
  let mut router = Router::new()
    .route("/auth/login",             post(auth::login::<B>))
    .route("/auth/logout",            post(auth::logout::<B>))
    .route("/auth/focus",             post(auth::focus::<B>))
    .route("/auth/password",          post(auth::update_password::<B>))
    .route("/auth/reset",             post(auth::request_reset::<B>))
    .route("/auth/reset/complete",    post(auth::complete_reset::<B>))
    .route("/signup",                 get(area::sign_up_page).post(auth::sign_up::<B>))
    .route("/session",                get(session::show::<B>))
    .route("/session/active-role",    post(session::set_active_role::<B>))
    .route("/login",                  get(area::sign_in_page))
    .route("/unauthorized",           get(area::unauthorized_page))
    .route("/api/users",              post(admin::create_user::<B>))
    .route("/api/users/{id}/roles",   put(admin::assign_roles::<B>))
    .route("/api/users/{id}/status",  put(admin::set_status::<B>))
    .route("/api/users/{id}/dropped", post(admin::toggle_dropped::<B>))
    .route("/api/roles/{role}/users", get(admin::list_by_role::<B>));

  for prefix in state.areas.prefixes() {
    router = router
      .route(prefix, get(area::view::<B>))
      .route(&format!("{prefix}/{{*rest}}"), get(area::view::<B>));
  }

  router.layer(TraceLayer::new_for_http()).with_state(state)
}
