//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings
//! (`2024-01-05T10:00:00.000000Z`) so that SQL string comparison orders them
//! chronologically and `substr(col, 1, 10)` yields the calendar day.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use segmentify_core::{
  history::HistoryEntry,
  membership::UserId,
  segment::{Segment, SegmentId, SegmentState},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `segments` row.
pub struct RawSegment {
  pub id:         SegmentId,
  pub slug:       String,
  pub is_deleted: bool,
}

impl RawSegment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      slug:       row.get(1)?,
      is_deleted: row.get(2)?,
    })
  }

  pub fn into_segment(self) -> Segment {
    Segment {
      id:    self.id,
      slug:  self.slug,
      state: SegmentState::from_deleted_flag(self.is_deleted),
    }
  }
}

/// Raw values read directly from a `user_segment_history` row.
pub struct RawHistoryEntry {
  pub user_id:      UserId,
  pub segment_slug: String,
  pub date_added:   String,
  pub date_removed: Option<String>,
}

impl RawHistoryEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:      row.get(0)?,
      segment_slug: row.get(1)?,
      date_added:   row.get(2)?,
      date_removed: row.get(3)?,
    })
  }

  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      user_id:    self.user_id,
      slug:       self.segment_slug,
      added_at:   decode_dt(&self.date_added)?,
      removed_at: self.date_removed.as_deref().map(decode_dt).transpose()?,
    })
  }
}
