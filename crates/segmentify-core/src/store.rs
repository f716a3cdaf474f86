//! The `SegmentStore` trait: catalog, membership ledger and history log.
//!
//! Implemented by storage backends (e.g. `segmentify-store-sqlite`). The HTTP
//! layer and the history exporter depend on this abstraction only.

use std::future::Future;

use crate::{
  history::{HistoryEvent, HistoryWindow},
  membership::{ActiveMembership, MembershipChange, UserId},
  segment::Segment,
};

/// Abstraction over a Segmentify storage backend.
///
/// Backend errors convert into [`crate::Error`] so callers can tell domain
/// outcomes (`NotFound`, `IncorrectRequest`, ...) apart from storage failures.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait SegmentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  // ── Catalog ───────────────────────────────────────────────────────────

  /// Create a segment. Fails with `AlreadyExists` if the slug was ever used,
  /// including by a deleted segment.
  fn create_segment(
    &self,
    slug: String,
  ) -> impl Future<Output = Result<Segment, Self::Error>> + Send + '_;

  /// Fetch a segment by slug, deleted or not. Fails with `NotFound`.
  fn get_segment(
    &self,
    slug: String,
  ) -> impl Future<Output = Result<Segment, Self::Error>> + Send + '_;

  /// List every segment, deleted ones included.
  fn list_segments(
    &self,
  ) -> impl Future<Output = Result<Vec<Segment>, Self::Error>> + Send + '_;

  /// Soft-delete a segment. Fails with `NotFound` if the slug does not exist
  /// or is already deleted. Existing memberships are left in place.
  fn delete_segment(
    &self,
    slug: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Validate and apply a membership batch atomically, recording history.
  ///
  /// Returns the user's active memberships after the commit (possibly empty).
  /// A refused batch leaves no trace in either memberships or history.
  fn change_membership(
    &self,
    change: MembershipChange,
  ) -> impl Future<Output = Result<Vec<ActiveMembership>, Self::Error>> + Send + '_;

  /// Memberships that are unexpired and whose segment is not deleted.
  /// Fails with `NoData` when there are none.
  fn active_memberships(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Vec<ActiveMembership>, Self::Error>> + Send + '_;

  // ── History ───────────────────────────────────────────────────────────

  /// Every add and remove event of `user_id` inside `window`, in retrieval
  /// order (not sorted). Fails with `NoHistoryData` when there are none.
  fn history(
    &self,
    user_id: UserId,
    window: HistoryWindow,
  ) -> impl Future<Output = Result<Vec<HistoryEvent>, Self::Error>> + Send + '_;
}
