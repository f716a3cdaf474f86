//! Process wiring for the Segmentify HTTP server.
//!
//! Holds the runtime configuration and layers tracing, CORS and request
//! timeouts over [`segmentify_api::api_router`]. The binary in `main.rs` only
//! reads configuration, opens the store and serves.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use axum::Router;
use segmentify_core::{export::HistoryExporter, store::SegmentStore};
use serde::Deserialize;
use tokio::signal;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `SEGMENTIFY_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  pub history_dir:          PathBuf,
  pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "0.0.0.0".to_string(),
      port:                 9090,
      store_path:           PathBuf::from("segmentify.db"),
      history_dir:          PathBuf::from("history"),
      request_timeout_secs: 10,
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }
}

// ─── Application ──────────────────────────────────────────────────────────────

/// The full service: API routes and artifact serving behind timeout, CORS
/// (any origin) and tracing layers.
pub fn app<S>(store: Arc<S>, config: &ServerConfig) -> Router
where
  S: SegmentStore + 'static,
{
  let exporter = HistoryExporter::new(expand_tilde(&config.history_dir));
  segmentify_api::api_router(store, exporter)
    .layer(TimeoutLayer::new(config.request_timeout()))
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = signal::ctrl_c().await {
      tracing::error!(error = %e, "failed to listen for SIGINT");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::error!(error = %e, "failed to install SIGTERM handler");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
    _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
