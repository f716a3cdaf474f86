//! SQL schema for the Segmentify SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Slugs are never reused; deletion only flips is_deleted.
CREATE TABLE IF NOT EXISTS segments (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    slug        TEXT    NOT NULL UNIQUE,
    is_deleted  INTEGER NOT NULL DEFAULT 0
);

-- One row per membership; deleted on explicit removal, left in place on
-- expiry (reads filter on expiration_date).
CREATE TABLE IF NOT EXISTS users_segments (
    user_id          INTEGER NOT NULL,
    slug             TEXT    NOT NULL REFERENCES segments(slug),
    expiration_date  TEXT,             -- RFC 3339 UTC, fixed width; NULL = never
    PRIMARY KEY (user_id, slug)
);

-- Append-only audit trail. The only permitted update is setting
-- date_removed on an open row, exactly once.
CREATE TABLE IF NOT EXISTS user_segment_history (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL,
    segment_slug  TEXT    NOT NULL REFERENCES segments(slug),
    date_added    TEXT    NOT NULL,    -- RFC 3339 UTC, fixed width
    date_removed  TEXT
);

CREATE TRIGGER IF NOT EXISTS segments_never_deleted
BEFORE DELETE ON segments
BEGIN
    SELECT RAISE(ABORT, 'segments are soft-deleted only');
END;

CREATE TRIGGER IF NOT EXISTS history_never_deleted
BEFORE DELETE ON user_segment_history
BEGIN
    SELECT RAISE(ABORT, 'history rows are never deleted');
END;

CREATE TRIGGER IF NOT EXISTS history_removed_once
BEFORE UPDATE ON user_segment_history
WHEN OLD.date_removed IS NOT NULL
  OR NEW.date_added IS NOT OLD.date_added
  OR NEW.user_id IS NOT OLD.user_id
  OR NEW.segment_slug IS NOT OLD.segment_slug
BEGIN
    SELECT RAISE(ABORT, 'history rows only transition from open to closed');
END;

CREATE INDEX IF NOT EXISTS users_segments_user_idx ON users_segments(user_id);
CREATE INDEX IF NOT EXISTS history_user_idx        ON user_segment_history(user_id);
CREATE INDEX IF NOT EXISTS history_open_idx
    ON user_segment_history(user_id, segment_slug)
    WHERE date_removed IS NULL;

PRAGMA user_version = 1;
";
