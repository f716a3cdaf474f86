//! Handlers for the segment catalog.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/segments` | Every segment, deleted ones included |
//! | `POST`   | `/segments` | Body: `{"slug":"PROMO_10"}`; 201 + `Location` |
//! | `GET`    | `/segments/{slug}` | 404 if the slug was never created |
//! | `DELETE` | `/segments/{slug}` | Soft delete; 204, or 404 if absent/already deleted |

use axum::{
  Json,
  extract::{Path, State, rejection::JsonRejection},
  http::{StatusCode, header},
  response::IntoResponse,
};
use segmentify_core::{
  segment::{Segment, SegmentId},
  store::SegmentStore,
};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError, validate::Problems};

/// Wire shape of a catalog entry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentBody {
  pub id:         SegmentId,
  pub slug:       String,
  pub is_deleted: bool,
}

impl From<Segment> for SegmentBody {
  fn from(s: Segment) -> Self {
    let is_deleted = s.is_deleted();
    Self { id: s.id, slug: s.slug, is_deleted }
  }
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /segments`
pub async fn list<S: SegmentStore>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<SegmentBody>>, ApiError> {
  let segments = state
    .store
    .list_segments()
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(segments.into_iter().map(SegmentBody::from).collect()))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub slug: String,
}

/// `POST /segments`, body: `{"slug":"PROMO_10"}`
pub async fn create<S: SegmentStore>(
  State(state): State<ApiState<S>>,
  body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

  let mut problems = Problems::new();
  problems.slug("slug", &body.slug);
  problems.into_result()?;

  let created = state
    .store
    .create_segment(body.slug)
    .await
    .map_err(ApiError::from_store)?;
  let location = format!("/segments/{}", created.slug);

  Ok((
    StatusCode::CREATED,
    [(header::LOCATION, location)],
    Json(SegmentBody::from(created)),
  ))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /segments/{slug}`
pub async fn get_one<S: SegmentStore>(
  State(state): State<ApiState<S>>,
  Path(slug): Path<String>,
) -> Result<Json<SegmentBody>, ApiError> {
  let segment = state
    .store
    .get_segment(slug)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(segment.into()))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /segments/{slug}`
pub async fn delete_one<S: SegmentStore>(
  State(state): State<ApiState<S>>,
  Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
  state
    .store
    .delete_segment(slug)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Shadowed slug ────────────────────────────────────────────────────────────

/// The one valid slug whose path collides with the `/segments/users` route.
pub const USERS_SLUG: &str = "users";

/// `GET /segments/users`
pub async fn get_users<S: SegmentStore>(
  state: State<ApiState<S>>,
) -> Result<Json<SegmentBody>, ApiError> {
  get_one(state, Path(USERS_SLUG.to_string())).await
}

/// `DELETE /segments/users`
pub async fn delete_users<S: SegmentStore>(
  state: State<ApiState<S>>,
) -> Result<StatusCode, ApiError> {
  delete_one(state, Path(USERS_SLUG.to_string())).await
}
