//! Turnstile server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the coordination API over HTTP.
//!
//! # Stale-record maintenance
//!
//! Records abandoned between resolution and completion stay pending forever;
//! reap them periodically (e.g. from cron):
//!
//! ```text
//! server --reap-stale-hours 24
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::Duration;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use turnstile_core::store::CoordinationStore as _;
use turnstile_http::{AppState, ServerConfig, scheduler::TokioScheduler};
use turnstile_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Turnstile coordination server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Reap idempotency records that have been pending longer than this many
  /// hours, then exit.
  #[arg(long)]
  reap_stale_hours: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TURNSTILE"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Maintenance mode: reap abandoned pending records and exit.
  if let Some(hours) = cli.reap_stale_hours {
    let reaped = store
      .reap_stale_pending(Duration::hours(hours))
      .await
      .context("failed to reap stale pending records")?;
    tracing::info!(reaped, hours, "reaped stale pending records");
    return Ok(());
  }

  // Build application state.
  let state = AppState {
    store:     Arc::new(store),
    scheduler: Arc::new(TokioScheduler),
    config:    Arc::new(server_cfg.clone()),
  };

  let app = turnstile_http::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
