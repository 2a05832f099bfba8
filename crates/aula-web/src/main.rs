//! `aula` server binary.
//!
//! Reads `aula.toml` (or the path given with `--config`) and `AULA_*`
//! environment variables, opens the SQLite store, restores the persisted
//! session and serves the application over HTTP.
//!
//! Seed the first administrator with:
//!
//! ```text
//! aula add-user root@example.edu --role admin
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use aula_core::role::Role;
use aula_web::{AppConfig, AppState, shared_backend};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Aula role-based access server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "aula.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve HTTP (the default).
  Serve,
  /// Register a principal with a password read from stdin.
  AddUser {
    email: String,
    #[arg(long)]
    name:  Option<String>,
    /// Role tag to assign; repeat for several.
    #[arg(long = "role")]
    roles: Vec<String>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let config = AppConfig::load(&cli.config).context("failed to load configuration")?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(config).await,
    Command::AddUser { email, name, roles } => add_user(config, &email, name, &roles).await,
  }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
  let backend = shared_backend(&config)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.store_path))?;

  let address = config.address();
  let refresh_every = config.token_refresh();
  let state = AppState::new(backend.clone(), config);

  state.store.rehydrate_from(backend.as_ref()).await;
  let persistence = state.store.spawn_persistence(Arc::clone(&backend));
  state.sync.spawn();
  backend.enable_auto_refresh(refresh_every);

  let app = aula_web::router(state.clone());
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
      }
    })
    .await
    .context("server error")?;

  tracing::info!("shutting down");
  state.sync.shutdown();
  backend.disable_auto_refresh();
  state
    .store
    .persist_to(backend.as_ref())
    .await
    .context("failed to persist session on shutdown")?;
  persistence.abort();
  Ok(())
}

async fn add_user(
  config: AppConfig,
  email: &str,
  name: Option<String>,
  roles: &[String],
) -> anyhow::Result<()> {
  let roles = roles
    .iter()
    .map(Role::new)
    .collect::<Result<Vec<_>, _>>()
    .context("invalid role tag")?;
  let password = read_password()?;
  anyhow::ensure!(!password.is_empty(), "password must not be empty");

  let backend = shared_backend(&config)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.store_path))?;
  let profile = backend
    .register_user(email, &password, name.as_deref(), &roles)
    .await
    .context("failed to register user")?;

  println!("{}", profile.id);
  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}
