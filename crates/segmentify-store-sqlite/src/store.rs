//! [`SqliteStore`], the SQLite implementation of [`SegmentStore`].

use std::{collections::HashSet, path::Path, sync::Arc};

use rusqlite::{OptionalExtension as _, Transaction, TransactionBehavior};
use segmentify_core::{
  clock::{Clock, SystemClock},
  history::{HistoryEvent, HistoryWindow, events_in_window},
  membership::{ActiveMembership, MembershipChange, UserId},
  segment::{Segment, SegmentState},
  store::SegmentStore,
};

use crate::{
  Error, Result,
  encode::{RawHistoryEntry, RawSegment, encode_date, encode_dt},
  schema::SCHEMA,
};

type Outcome<T> = segmentify_core::Result<T>;

const SELECT_ACTIVE: &str = "
  SELECT m.slug
  FROM users_segments m
  JOIN segments s ON s.slug = m.slug
  WHERE m.user_id = ?1
    AND s.is_deleted = 0
    AND (m.expiration_date IS NULL OR m.expiration_date > ?2)
  ORDER BY m.slug";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Segmentify store backed by a single SQLite file.
///
/// Cloning shares the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  /// Replace the time source used for history timestamps and expiry checks.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, clock: Arc::new(SystemClock) })
  }

  /// Run raw SQL against the connection; lets tests inject faults.
  #[cfg(test)]
  pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Evaluate a single-integer query; lets tests inspect raw table state.
  #[cfg(test)]
  pub(crate) async fn count(&self, sql: &'static str) -> Result<i64> {
    Ok(self.conn.call(move |conn| Ok(conn.query_row(sql, [], |r| r.get(0))?)).await?)
  }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

/// Run `body` inside an `IMMEDIATE` transaction.
///
/// Commits only when `body` yields `Ok(Ok(_))`. A refused operation or a
/// database error rolls back; a failing rollback is logged and the outcome
/// of `body` is still returned.
fn in_transaction<T>(
  conn: &mut rusqlite::Connection,
  body: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<Outcome<T>>,
) -> rusqlite::Result<Outcome<T>> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  match body(&tx) {
    Ok(Ok(value)) => {
      tx.commit()?;
      Ok(Ok(value))
    }
    outcome => {
      if let Err(e) = tx.rollback() {
        tracing::error!(error = %e, "failed to roll back transaction");
      }
      outcome
    }
  }
}

fn find_segment(
  conn: &rusqlite::Connection,
  slug: &str,
) -> rusqlite::Result<Option<RawSegment>> {
  conn
    .query_row(
      "SELECT id, slug, is_deleted FROM segments WHERE slug = ?1",
      rusqlite::params![slug],
      RawSegment::from_row,
    )
    .optional()
}

fn select_active(
  conn: &rusqlite::Connection,
  user_id: UserId,
  now: &str,
) -> rusqlite::Result<Vec<ActiveMembership>> {
  let mut stmt = conn.prepare_cached(SELECT_ACTIVE)?;
  stmt
    .query_map(rusqlite::params![user_id, now], |row| {
      Ok(ActiveMembership { slug: row.get(0)? })
    })?
    .collect()
}

/// The ledger's commit path: preconditions, then the four ordered writes.
fn apply_change(
  tx: &Transaction<'_>,
  change: &MembershipChange,
  now: &str,
) -> rusqlite::Result<Outcome<Vec<ActiveMembership>>> {
  use segmentify_core::Error as Core;

  // 1. Added segments must exist and not be deleted.
  for add in &change.add {
    match find_segment(tx, &add.slug)?.map(RawSegment::into_segment) {
      None => return Ok(Err(Core::SegmentNotFound(add.slug.clone()))),
      Some(s) if s.is_deleted() => {
        return Ok(Err(Core::SegmentDeleted(add.slug.clone())));
      }
      Some(_) => {}
    }
  }

  // 2. Removed segments must exist, deleted or not.
  for slug in &change.remove {
    if find_segment(tx, slug)?.is_none() {
      return Ok(Err(Core::SegmentNotFound(slug.clone())));
    }
  }

  // 3. The batch must be consistent with the user's active set.
  let active: HashSet<String> = select_active(tx, change.user_id, now)?
    .into_iter()
    .map(|m| m.slug)
    .collect();
  if let Err(e) = change.validate(&active) {
    return Ok(Err(e));
  }

  // Commit, in order: memberships added, history opened, memberships
  // removed, history closed. A conflicting membership row can only be an
  // expired one here, so it is overwritten in place.
  {
    let mut stmt = tx.prepare_cached(
      "INSERT INTO users_segments (user_id, slug, expiration_date)
       VALUES (?1, ?2, ?3)
       ON CONFLICT (user_id, slug) DO UPDATE SET expiration_date = excluded.expiration_date",
    )?;
    for add in &change.add {
      let expires = add.expires_at.map(encode_dt);
      stmt.execute(rusqlite::params![change.user_id, add.slug, expires])?;
    }
  }
  {
    let mut stmt = tx.prepare_cached(
      "INSERT INTO user_segment_history (user_id, segment_slug, date_added)
       VALUES (?1, ?2, ?3)",
    )?;
    for add in &change.add {
      stmt.execute(rusqlite::params![change.user_id, add.slug, now])?;
    }
  }
  {
    let mut stmt = tx.prepare_cached(
      "DELETE FROM users_segments WHERE user_id = ?1 AND slug = ?2",
    )?;
    for slug in &change.remove {
      stmt.execute(rusqlite::params![change.user_id, slug])?;
    }
  }
  {
    let mut stmt = tx.prepare_cached(
      "UPDATE user_segment_history SET date_removed = ?1
       WHERE id = (
         SELECT id FROM user_segment_history
         WHERE user_id = ?2 AND segment_slug = ?3 AND date_removed IS NULL
         ORDER BY id DESC
         LIMIT 1
       )",
    )?;
    for slug in &change.remove {
      let closed = stmt.execute(rusqlite::params![now, change.user_id, slug])?;
      if closed == 0 {
        tracing::warn!(
          user_id = change.user_id,
          slug = %slug,
          "removed membership had no open history entry"
        );
      }
    }
  }

  Ok(Ok(select_active(tx, change.user_id, now)?))
}

// ─── SegmentStore impl ───────────────────────────────────────────────────────

impl SegmentStore for SqliteStore {
  type Error = Error;

  // ── Catalog ───────────────────────────────────────────────────────────────

  async fn create_segment(&self, slug: String) -> Result<Segment> {
    let segment = self
      .conn
      .call(move |conn| {
        Ok(in_transaction(conn, |tx| {
          if find_segment(tx, &slug)?.is_some() {
            return Ok(Err(segmentify_core::Error::AlreadyExists(slug.clone())));
          }
          tx.execute("INSERT INTO segments (slug) VALUES (?1)", rusqlite::params![slug])?;
          Ok(Ok(Segment {
            id:    tx.last_insert_rowid(),
            slug:  slug.clone(),
            state: SegmentState::Active,
          }))
        })?)
      })
      .await??;

    tracing::info!(id = segment.id, slug = %segment.slug, "created segment");
    Ok(segment)
  }

  async fn get_segment(&self, slug: String) -> Result<Segment> {
    let lookup = slug.clone();
    let raw = self
      .conn
      .call(move |conn| Ok(find_segment(conn, &lookup)?))
      .await?;

    raw
      .map(RawSegment::into_segment)
      .ok_or_else(|| segmentify_core::Error::NotFound(slug).into())
  }

  async fn list_segments(&self) -> Result<Vec<Segment>> {
    let raws: Vec<RawSegment> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT id, slug, is_deleted FROM segments ORDER BY id")?;
        let rows = stmt
          .query_map([], RawSegment::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawSegment::into_segment).collect())
  }

  async fn delete_segment(&self, slug: String) -> Result<()> {
    let target = slug.clone();
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE segments SET is_deleted = 1 WHERE slug = ?1 AND is_deleted = 0",
          rusqlite::params![target],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(segmentify_core::Error::NotFound(slug).into());
    }
    tracing::info!(slug = %slug, "deleted segment");
    Ok(())
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn change_membership(
    &self,
    change: MembershipChange,
  ) -> Result<Vec<ActiveMembership>> {
    let user_id = change.user_id;
    let conflicts = change.conflicts();
    if !conflicts.is_empty() {
      return Err(segmentify_core::Error::IncorrectRequest(conflicts).into());
    }

    let (added, removed) = (change.add.len(), change.remove.len());
    let now = encode_dt(self.clock.now());

    let outcome = self
      .conn
      .call(move |conn| Ok(in_transaction(conn, |tx| apply_change(tx, &change, &now))?))
      .await
      .inspect_err(|e| {
        tracing::error!(user_id, error = %e, "membership change failed");
      })?;

    match &outcome {
      Ok(active) => tracing::info!(
        user_id,
        added,
        removed,
        active = active.len(),
        "changed user segments"
      ),
      Err(e) => tracing::debug!(user_id, error = %e, "membership change refused"),
    }
    Ok(outcome?)
  }

  async fn active_memberships(&self, user_id: UserId) -> Result<Vec<ActiveMembership>> {
    let now = encode_dt(self.clock.now());
    let active = self
      .conn
      .call(move |conn| Ok(select_active(conn, user_id, &now)?))
      .await?;

    if active.is_empty() {
      return Err(segmentify_core::Error::NoData(user_id).into());
    }
    Ok(active)
  }

  // ── History ───────────────────────────────────────────────────────────────

  async fn history(
    &self,
    user_id: UserId,
    window: HistoryWindow,
  ) -> Result<Vec<HistoryEvent>> {
    let from = encode_date(window.from());
    let to = encode_date(window.to());

    let raws: Vec<RawHistoryEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT user_id, segment_slug, date_added, date_removed
           FROM user_segment_history
           WHERE user_id = ?1
             AND (substr(date_added, 1, 10) BETWEEN ?2 AND ?3
                  OR substr(date_removed, 1, 10) BETWEEN ?2 AND ?3)
           ORDER BY id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_id, from, to], RawHistoryEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let entries = raws
      .into_iter()
      .map(RawHistoryEntry::into_entry)
      .collect::<Result<Vec<_>>>()?;
    let events = events_in_window(&entries, &window);

    if events.is_empty() {
      return Err(segmentify_core::Error::NoHistoryData(user_id).into());
    }
    Ok(events)
  }
}
