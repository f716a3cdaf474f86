//! The append-only audit trail of membership changes.
//!
//! Each [`HistoryEntry`] covers one membership from the moment it was added to
//! the moment it was explicitly removed. Entries are read back as a stream of
//! [`HistoryEvent`]s: an entry contributes an `add` event and, once closed, a
//! `remove` event, each only if its timestamp lies inside the requested
//! [`HistoryWindow`].

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, membership::UserId};

// ─── Operation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
  Add,
  Remove,
}

impl Operation {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Add => "add",
      Self::Remove => "remove",
    }
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Window ──────────────────────────────────────────────────────────────────

/// An inclusive range of calendar days (UTC). An event on `to` at 23:59:59 is
/// still inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
  from: NaiveDate,
  to:   NaiveDate,
}

impl HistoryWindow {
  pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
    if from > to {
      return Err(Error::Invalid(vec![format!(
        "from ({from}) is after to ({to})"
      )]));
    }
    Ok(Self { from, to })
  }

  pub fn from(&self) -> NaiveDate { self.from }

  pub fn to(&self) -> NaiveDate { self.to }

  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    let day = at.date_naive();
    self.from <= day && day <= self.to
  }
}

// ─── Entries and events ──────────────────────────────────────────────────────

/// One membership's lifecycle as recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub user_id:    UserId,
  pub slug:       String,
  /// Set once, when the add is committed.
  pub added_at:   DateTime<Utc>,
  /// Set once, when the explicit remove is committed. Expiry leaves it empty.
  pub removed_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
  /// Append the events of this entry that fall inside `window` to `out`.
  pub fn push_events(&self, window: &HistoryWindow, out: &mut Vec<HistoryEvent>) {
    if window.contains(self.added_at) {
      out.push(self.event(Operation::Add, self.added_at));
    }
    if let Some(removed_at) = self.removed_at
      && window.contains(removed_at)
    {
      out.push(self.event(Operation::Remove, removed_at));
    }
  }

  fn event(&self, operation: Operation, at: DateTime<Utc>) -> HistoryEvent {
    HistoryEvent {
      user_id: self.user_id,
      slug: self.slug.clone(),
      operation,
      at,
    }
  }
}

/// A single add or remove, as exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
  pub user_id:   UserId,
  pub slug:      String,
  pub operation: Operation,
  pub at:        DateTime<Utc>,
}

/// Expand entries into the events that fall inside `window`, preserving the
/// order in which the entries were retrieved.
pub fn events_in_window<'a>(
  entries: impl IntoIterator<Item = &'a HistoryEntry>,
  window: &HistoryWindow,
) -> Vec<HistoryEvent> {
  let mut events = Vec::new();
  for entry in entries {
    entry.push_events(window, &mut events);
  }
  events
}

/// Order events by timestamp, ascending. The sort is stable, so events with
/// equal timestamps keep their retrieval order.
pub fn sort_chronologically(events: &mut [HistoryEvent]) {
  events.sort_by_key(|e| e.at);
}
