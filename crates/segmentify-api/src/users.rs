//! Handlers for user memberships and their history.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/segments/users/{id}` | Active slugs; 404 when there are none |
//! | `POST` | `/segments/users` | Body: [`ChangeBody`]; returns the post-change active set |
//! | `GET`  | `/segments/users/{id}/history` | `?from=YYYY-MM-DD&to=YYYY-MM-DD`; returns a CSV link |

use axum::{
  Json,
  extract::{Path, Query, State, rejection::JsonRejection},
  http::HeaderMap,
};
use segmentify_core::{
  history::HistoryWindow,
  membership::{ActiveMembership, MembershipAdd, MembershipChange},
  store::SegmentStore,
};
use serde::{Deserialize, Serialize};

use crate::{
  ApiState,
  error::ApiError,
  validate::{Problems, link_host, path_user_id, query_day},
};

// ─── Active ───────────────────────────────────────────────────────────────────

/// `GET /segments/users/{id}`
pub async fn active<S: SegmentStore>(
  State(state): State<ApiState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Vec<ActiveMembership>>, ApiError> {
  let user_id = path_user_id(&id)?;
  let active = state
    .store
    .active_memberships(user_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(active))
}

// ─── Change ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddBody {
  pub slug:    String,
  /// Optional expiry, `YYYY-MM-DDTHH:MM:SSZ`.
  pub expired: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveBody {
  pub slug: String,
}

/// `POST /segments/users` body.
#[derive(Debug, Deserialize)]
pub struct ChangeBody {
  pub id:     i64,
  #[serde(default)]
  pub add:    Vec<AddBody>,
  #[serde(default)]
  pub remove: Vec<RemoveBody>,
}

impl ChangeBody {
  /// Validate every field and build the store request, or report all problems.
  pub fn into_change(self) -> Result<MembershipChange, ApiError> {
    let mut problems = Problems::new();
    problems.user_id("id", self.id);

    let mut change = MembershipChange::new(self.id);
    for (i, add) in self.add.into_iter().enumerate() {
      problems.slug(&format!("add[{i}].slug"), &add.slug);
      let expires_at = match add.expired.as_deref() {
        Some(raw) => problems.expiry(&format!("add[{i}].expired"), raw),
        None => None,
      };
      change.add.push(MembershipAdd { slug: add.slug, expires_at });
    }
    for (i, remove) in self.remove.into_iter().enumerate() {
      problems.slug(&format!("remove[{i}].slug"), &remove.slug);
      change.remove.push(remove.slug);
    }

    problems.into_result()?;
    Ok(change)
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangeResponse {
  pub active_segments: Vec<ActiveMembership>,
}

/// `POST /segments/users`
pub async fn change<S: SegmentStore>(
  State(state): State<ApiState<S>>,
  body: Result<Json<ChangeBody>, JsonRejection>,
) -> Result<Json<ChangeResponse>, ApiError> {
  let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let change = body.into_change()?;

  let active_segments = state
    .store
    .change_membership(change)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ChangeResponse { active_segments }))
}

// ─── History ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub from: Option<String>,
  pub to:   Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
  pub link: String,
}

/// `GET /segments/users/{id}/history?from=YYYY-MM-DD&to=YYYY-MM-DD`
pub async fn history<S: SegmentStore>(
  State(state): State<ApiState<S>>,
  Path(id): Path<String>,
  Query(params): Query<HistoryParams>,
  headers: HeaderMap,
) -> Result<Json<HistoryResponse>, ApiError> {
  let user_id = path_user_id(&id)?;
  let host = link_host(&headers)?;
  let from = query_day("from", params.from.as_deref())?;
  let to = query_day("to", params.to.as_deref())?;
  let window = HistoryWindow::new(from, to).map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let locator = state
    .exporter
    .export(state.store.as_ref(), user_id, window)
    .await?;

  Ok(Json(HistoryResponse { link: format!("http://{host}/history/{locator}") }))
}
