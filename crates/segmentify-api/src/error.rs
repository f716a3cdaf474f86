//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  Conflict(String),

  #[error("{0}")]
  BadRequest(String),

  #[error("validation failed")]
  Validation(Vec<String>),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Adapter for `map_err` on any store error convertible to the core error.
  pub fn from_store<E: Into<segmentify_core::Error>>(e: E) -> Self { e.into().into() }
}

impl From<segmentify_core::Error> for ApiError {
  fn from(e: segmentify_core::Error) -> Self {
    use segmentify_core::Error as E;
    match e {
      E::NotFound(_) | E::SegmentNotFound(_) | E::NoData(_) | E::NoHistoryData(_) => {
        Self::NotFound(e.to_string())
      }
      E::AlreadyExists(_) => Self::Conflict(e.to_string()),
      E::SegmentDeleted(_) | E::IncorrectRequest(_) => Self::BadRequest(e.to_string()),
      E::Invalid(messages) => Self::Validation(messages),
      E::Storage(_) | E::Io(_) | E::Csv(_) => Self::Internal(Box::new(e)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, json!({ "error": m })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Validation(messages) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "error": "validation failed", "messages": messages }),
      ),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal server error" }))
      }
    };
    (status, Json(body)).into_response()
  }
}
