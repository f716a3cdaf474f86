//! JSON REST API for Segmentify.
//!
//! Exposes an axum [`Router`] backed by any [`segmentify_core::store::SegmentStore`]
//! plus a [`HistoryExporter`] whose artifact root is also served under
//! `/history`. Tracing, timeouts, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = segmentify_api::api_router(Arc::new(store), HistoryExporter::new("history"));
//! ```

pub mod error;
pub mod segments;
pub mod users;
pub mod validate;

use std::sync::Arc;

use axum::{
  Router,
  http::StatusCode,
  routing::{get, post},
};
use segmentify_core::{export::HistoryExporter, store::SegmentStore};
use tower_http::services::ServeDir;

pub use error::ApiError;

/// Shared handler state: the store and the exporter writing history artifacts.
pub struct ApiState<S> {
  pub store:    Arc<S>,
  pub exporter: Arc<HistoryExporter>,
}

// Manual impl: `S` itself need not be `Clone`.
impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), exporter: self.exporter.clone() }
  }
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, exporter: HistoryExporter) -> Router<()>
where
  S: SegmentStore + 'static,
{
  let artifacts = ServeDir::new(exporter.root());
  let state = ApiState { store, exporter: Arc::new(exporter) };

  Router::new()
    // Catalog
    .route("/segments", get(segments::list::<S>).post(segments::create::<S>))
    .route(
      "/segments/{slug}",
      get(segments::get_one::<S>).delete(segments::delete_one::<S>),
    )
    // Ledger. `users` is also a valid slug, so reads and deletes on this
    // path still reach the catalog.
    .route(
      "/segments/users",
      post(users::change::<S>)
        .get(segments::get_users::<S>)
        .delete(segments::delete_users::<S>),
    )
    .route("/segments/users/{id}", get(users::active::<S>))
    .route("/segments/users/{id}/history", get(users::history::<S>))
    // Operational
    .route("/-/healthy", get(|| async { StatusCode::OK }))
    .nest_service("/history", artifacts)
    .with_state(state)
}
