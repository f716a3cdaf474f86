//! Segments: named cohort labels that users can hold.
//!
//! A slug is never physically removed once created. Deletion only moves the
//! segment into [`SegmentState::Deleted`], which keeps the slug reserved and
//! the history that references it meaningful.

use serde::{Deserialize, Serialize};

/// Surrogate key assigned by the store on creation.
pub type SegmentId = i64;

/// Lifecycle of a segment in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentState {
  Active,
  Deleted,
}

impl SegmentState {
  pub fn from_deleted_flag(is_deleted: bool) -> Self {
    if is_deleted { Self::Deleted } else { Self::Active }
  }

  pub fn is_deleted(self) -> bool { matches!(self, Self::Deleted) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
  pub id:    SegmentId,
  pub slug:  String,
  pub state: SegmentState,
}

impl Segment {
  pub fn is_deleted(&self) -> bool { self.state.is_deleted() }
}
