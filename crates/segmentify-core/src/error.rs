//! Error types for `segmentify-core`.

use std::fmt;

use thiserror::Error;

use crate::membership::UserId;

/// One reason a membership batch was refused.
///
/// Batches are validated as a whole; every offending slug is reported at once
/// inside [`Error::IncorrectRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
  /// The slug is in the add list but the user already holds it.
  AlreadyActive(String),
  /// The slug is in the remove list but the user does not hold it.
  NotActive(String),
  /// The slug appears in both the add and the remove list.
  AddedAndRemoved(String),
  /// The slug appears more than once in the same list.
  Duplicate(String),
}

impl Violation {
  pub fn slug(&self) -> &str {
    match self {
      Self::AlreadyActive(s)
      | Self::NotActive(s)
      | Self::AddedAndRemoved(s)
      | Self::Duplicate(s) => s,
    }
  }
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::AlreadyActive(s) => write!(f, "user already has segment \"{s}\""),
      Self::NotActive(s) => write!(f, "user does not have segment \"{s}\""),
      Self::AddedAndRemoved(s) => {
        write!(f, "segment \"{s}\" is both added and removed")
      }
      Self::Duplicate(s) => write!(f, "segment \"{s}\" is listed more than once"),
    }
  }
}

fn join_violations(violations: &[Violation]) -> String {
  violations
    .iter()
    .map(Violation::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("segment not found: {0}")]
  NotFound(String),

  #[error("segment already exists: {0}")]
  AlreadyExists(String),

  #[error("request contains unknown segment: {0}")]
  SegmentNotFound(String),

  #[error("request contains deleted segment: {0}")]
  SegmentDeleted(String),

  #[error("request is incorrect: {}", join_violations(.0))]
  IncorrectRequest(Vec<Violation>),

  #[error("no active segments for user {0}")]
  NoData(UserId),

  #[error("no segment history for user {0}")]
  NoHistoryData(UserId),

  #[error("invalid input: {}", .0.join("; "))]
  Invalid(Vec<String>),

  #[error("storage failure: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("artifact i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
