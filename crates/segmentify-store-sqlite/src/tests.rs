//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone as _, Utc};
use segmentify_core::{
  Violation,
  clock::MockClock,
  export::HistoryExporter,
  history::{HistoryWindow, Operation},
  membership::{ActiveMembership, MembershipAdd, MembershipChange},
  segment::SegmentState,
  store::SegmentStore,
};

use crate::{Error, SqliteStore};

use segmentify_core::Error as Core;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap() }

async fn clocked_store() -> (SqliteStore, Arc<MockClock>) {
  let clock = Arc::new(MockClock::with_time(t0()));
  let s = store().await.with_clock(clock.clone());
  (s, clock)
}

async fn with_segments(s: &SqliteStore, slugs: &[&str]) {
  for slug in slugs {
    s.create_segment((*slug).to_owned()).await.unwrap();
  }
}

fn slugs(active: &[ActiveMembership]) -> Vec<&str> {
  active.iter().map(|m| m.slug.as_str()).collect()
}

fn may(from: u32, to: u32) -> HistoryWindow {
  HistoryWindow::new(
    NaiveDate::from_ymd_opt(2024, 5, from).unwrap(),
    NaiveDate::from_ymd_opt(2024, 5, to).unwrap(),
  )
  .unwrap()
}

fn add(slug: &str) -> MembershipChange { MembershipChange::new(42).with_add(MembershipAdd::new(slug)) }

fn remove(slug: &str) -> MembershipChange { MembershipChange::new(42).with_remove(slug) }

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_assigns_ids_and_rejects_reuse() {
  let s = store().await;

  let seg = s.create_segment("PROMO_10".into()).await.unwrap();
  assert_eq!(seg.id, 1);
  assert_eq!(seg.state, SegmentState::Active);

  let err = s.create_segment("PROMO_10".into()).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::AlreadyExists(ref slug)) if slug == "PROMO_10"));
}

#[tokio::test]
async fn deleted_slug_is_never_reused() {
  let s = store().await;
  s.create_segment("PROMO_10".into()).await.unwrap();
  s.delete_segment("PROMO_10".into()).await.unwrap();

  let err = s.create_segment("PROMO_10".into()).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::AlreadyExists(_))));
}

#[tokio::test]
async fn get_returns_deleted_segments_too() {
  let s = store().await;
  s.create_segment("PROMO_10".into()).await.unwrap();
  s.delete_segment("PROMO_10".into()).await.unwrap();

  let seg = s.get_segment("PROMO_10".into()).await.unwrap();
  assert!(seg.is_deleted());
}

#[tokio::test]
async fn get_missing_segment_is_not_found() {
  let s = store().await;
  let err = s.get_segment("NOPE_NOPE".into()).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::NotFound(_))));
}

#[tokio::test]
async fn list_includes_deleted_segments_in_creation_order() {
  let s = store().await;
  with_segments(&s, &["ALPHA_1", "BRAVO_2", "CHARLIE_3"]).await;
  s.delete_segment("BRAVO_2".into()).await.unwrap();

  let all = s.list_segments().await.unwrap();
  let states: Vec<_> = all.iter().map(|seg| (seg.slug.as_str(), seg.state)).collect();
  assert_eq!(states, vec![
    ("ALPHA_1", SegmentState::Active),
    ("BRAVO_2", SegmentState::Deleted),
    ("CHARLIE_3", SegmentState::Active),
  ]);
}

#[tokio::test]
async fn delete_twice_is_not_found() {
  let s = store().await;
  s.create_segment("PROMO_10".into()).await.unwrap();
  s.delete_segment("PROMO_10".into()).await.unwrap();

  let err = s.delete_segment("PROMO_10".into()).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::NotFound(_))));

  let err = s.delete_segment("NEVER_SEEN".into()).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::NotFound(_))));
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_then_get_active() {
  let s = store().await;
  with_segments(&s, &["PROMO_10"]).await;

  let active = s.change_membership(add("PROMO_10")).await.unwrap();
  assert_eq!(slugs(&active), ["PROMO_10"]);

  let active = s.active_memberships(42).await.unwrap();
  assert_eq!(slugs(&active), ["PROMO_10"]);
}

#[tokio::test]
async fn user_without_memberships_has_no_data() {
  let s = store().await;
  let err = s.active_memberships(42).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::NoData(42))));
}

#[tokio::test]
async fn remove_then_history_shows_add_and_remove() {
  let (s, clock) = clocked_store().await;
  with_segments(&s, &["PROMO_10"]).await;

  s.change_membership(add("PROMO_10")).await.unwrap();
  clock.advance(TimeDelta::hours(1));
  let active = s.change_membership(remove("PROMO_10")).await.unwrap();
  assert!(active.is_empty());

  let err = s.active_memberships(42).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::NoData(42))));

  let events = s.history(42, may(1, 31)).await.unwrap();
  let ops: Vec<_> = events.iter().map(|e| (e.slug.as_str(), e.operation)).collect();
  assert_eq!(ops, vec![("PROMO_10", Operation::Add), ("PROMO_10", Operation::Remove)]);
  assert_eq!(events[0].at, t0());
  assert_eq!(events[1].at, t0() + TimeDelta::hours(1));
}

#[tokio::test]
async fn adding_an_active_segment_is_refused_without_side_effects() {
  let s = store().await;
  with_segments(&s, &["PROMO_10", "VOICE_MSG"]).await;
  s.change_membership(add("PROMO_10")).await.unwrap();

  let batch = MembershipChange::new(42)
    .with_add(MembershipAdd::new("VOICE_MSG"))
    .with_add(MembershipAdd::new("PROMO_10"));
  let err = s.change_membership(batch).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(Core::IncorrectRequest(ref v)) if v == &[Violation::AlreadyActive("PROMO_10".into())]
  ));

  let active = s.active_memberships(42).await.unwrap();
  assert_eq!(slugs(&active), ["PROMO_10"]);
  let history_rows = s.count("SELECT COUNT(*) FROM user_segment_history").await.unwrap();
  assert_eq!(history_rows, 1);
}

#[tokio::test]
async fn violations_are_aggregated() {
  let s = store().await;
  with_segments(&s, &["PROMO_10", "VOICE_MSG", "DISCOUNT_30"]).await;
  s.change_membership(add("PROMO_10")).await.unwrap();

  let batch = MembershipChange::new(42)
    .with_add(MembershipAdd::new("PROMO_10"))
    .with_remove("VOICE_MSG")
    .with_remove("DISCOUNT_30");
  let Error::Core(Core::IncorrectRequest(violations)) =
    s.change_membership(batch).await.unwrap_err()
  else {
    panic!("expected IncorrectRequest");
  };
  let offending: Vec<_> = violations.iter().map(Violation::slug).collect();
  assert_eq!(offending, ["PROMO_10", "VOICE_MSG", "DISCOUNT_30"]);
}

#[tokio::test]
async fn adding_a_deleted_segment_fails() {
  let s = store().await;
  with_segments(&s, &["PROMO_10"]).await;
  s.delete_segment("PROMO_10".into()).await.unwrap();

  let err = s
    .change_membership(MembershipChange::new(7).with_add(MembershipAdd::new("PROMO_10")))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(Core::SegmentDeleted(_))));
}

#[tokio::test]
async fn unknown_segments_fail_in_either_list() {
  let s = store().await;

  let err = s.change_membership(add("GHOST_SEG")).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::SegmentNotFound(ref slug)) if slug == "GHOST_SEG"));

  let err = s.change_membership(remove("GHOST_SEG")).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::SegmentNotFound(_))));
}

#[tokio::test]
async fn slug_in_both_lists_is_refused() {
  let s = store().await;
  with_segments(&s, &["PROMO_10"]).await;
  s.change_membership(add("PROMO_10")).await.unwrap();

  let batch = add("PROMO_10").with_remove("PROMO_10");
  let err = s.change_membership(batch).await.unwrap_err();
  let Error::Core(Core::IncorrectRequest(violations)) = err else {
    panic!("expected IncorrectRequest");
  };
  assert!(violations.contains(&Violation::AddedAndRemoved("PROMO_10".into())));
  assert_eq!(slugs(&s.active_memberships(42).await.unwrap()), ["PROMO_10"]);
}

#[tokio::test]
async fn post_state_is_pre_state_minus_removed_plus_added() {
  let s = store().await;
  with_segments(&s, &["ALPHA_1", "BRAVO_2", "CHARLIE_3", "DELTA_4"]).await;
  s.change_membership(add("ALPHA_1").with_add(MembershipAdd::new("BRAVO_2")))
    .await
    .unwrap();

  let batch = MembershipChange::new(42)
    .with_add(MembershipAdd::new("CHARLIE_3"))
    .with_add(MembershipAdd::new("DELTA_4"))
    .with_remove("ALPHA_1");
  let active = s.change_membership(batch).await.unwrap();
  assert_eq!(slugs(&active), ["BRAVO_2", "CHARLIE_3", "DELTA_4"]);
}

#[tokio::test]
async fn memberships_are_scoped_per_user() {
  let s = store().await;
  with_segments(&s, &["PROMO_10"]).await;
  s.change_membership(add("PROMO_10")).await.unwrap();

  let other = MembershipChange::new(43).with_add(MembershipAdd::new("PROMO_10"));
  assert_eq!(slugs(&s.change_membership(other).await.unwrap()), ["PROMO_10"]);
  assert!(matches!(
    s.active_memberships(44).await.unwrap_err(),
    Error::Core(Core::NoData(44))
  ));
}

#[tokio::test]
async fn deleted_segment_disappears_from_active_view() {
  let s = store().await;
  with_segments(&s, &["PROMO_10", "VOICE_MSG"]).await;
  s.change_membership(add("PROMO_10").with_add(MembershipAdd::new("VOICE_MSG")))
    .await
    .unwrap();

  s.delete_segment("VOICE_MSG".into()).await.unwrap();

  assert_eq!(slugs(&s.active_memberships(42).await.unwrap()), ["PROMO_10"]);
  let rows = s.count("SELECT COUNT(*) FROM users_segments").await.unwrap();
  assert_eq!(rows, 2, "soft delete must not cascade to memberships");
}

// ─── Expiry ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_membership_is_hidden_but_not_logged() {
  let (s, clock) = clocked_store().await;
  with_segments(&s, &["PROMO_10"]).await;

  let batch = MembershipChange::new(42)
    .with_add(MembershipAdd::until("PROMO_10", t0() + TimeDelta::days(1)));
  s.change_membership(batch).await.unwrap();
  assert_eq!(slugs(&s.active_memberships(42).await.unwrap()), ["PROMO_10"]);

  clock.advance(TimeDelta::days(2));
  assert!(matches!(
    s.active_memberships(42).await.unwrap_err(),
    Error::Core(Core::NoData(42))
  ));

  let events = s.history(42, may(1, 31)).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].operation, Operation::Add);
}

#[tokio::test]
async fn expired_membership_cannot_be_removed_but_can_be_readded() {
  let (s, clock) = clocked_store().await;
  with_segments(&s, &["PROMO_10"]).await;

  let batch = MembershipChange::new(42)
    .with_add(MembershipAdd::until("PROMO_10", t0() + TimeDelta::hours(1)));
  s.change_membership(batch).await.unwrap();
  clock.advance(TimeDelta::hours(2));

  let err = s.change_membership(remove("PROMO_10")).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::IncorrectRequest(_))));

  let active = s.change_membership(add("PROMO_10")).await.unwrap();
  assert_eq!(slugs(&active), ["PROMO_10"]);

  // Expiry never closed the first entry; both stay open.
  let open = s
    .count("SELECT COUNT(*) FROM user_segment_history WHERE date_removed IS NULL")
    .await
    .unwrap();
  assert_eq!(open, 2);
}

// ─── History invariants ──────────────────────────────────────────────────────

#[tokio::test]
async fn one_open_entry_per_active_membership() {
  let s = store().await;
  with_segments(&s, &["ALPHA_1", "BRAVO_2"]).await;

  s.change_membership(add("ALPHA_1").with_add(MembershipAdd::new("BRAVO_2")))
    .await
    .unwrap();
  s.change_membership(remove("ALPHA_1")).await.unwrap();
  s.change_membership(add("ALPHA_1")).await.unwrap();

  let open = s
    .count("SELECT COUNT(*) FROM user_segment_history WHERE date_removed IS NULL")
    .await
    .unwrap();
  let closed = s
    .count("SELECT COUNT(*) FROM user_segment_history WHERE date_removed IS NOT NULL")
    .await
    .unwrap();
  assert_eq!(open, 2);
  assert_eq!(closed, 1);
}

#[tokio::test]
async fn remove_closes_only_the_latest_open_entry() {
  let (s, clock) = clocked_store().await;
  with_segments(&s, &["PROMO_10"]).await;

  let batch = MembershipChange::new(42)
    .with_add(MembershipAdd::until("PROMO_10", t0() + TimeDelta::hours(1)));
  s.change_membership(batch).await.unwrap();
  clock.advance(TimeDelta::hours(2));
  s.change_membership(add("PROMO_10")).await.unwrap();
  clock.advance(TimeDelta::hours(1));
  s.change_membership(remove("PROMO_10")).await.unwrap();

  let first_open = s
    .count("SELECT date_removed IS NULL FROM user_segment_history WHERE id = 1")
    .await
    .unwrap();
  let second_open = s
    .count("SELECT date_removed IS NULL FROM user_segment_history WHERE id = 2")
    .await
    .unwrap();
  assert_eq!(first_open, 1);
  assert_eq!(second_open, 0);
}

#[tokio::test]
async fn closed_history_rows_cannot_be_rewritten() {
  let s = store().await;
  with_segments(&s, &["PROMO_10"]).await;
  s.change_membership(add("PROMO_10")).await.unwrap();
  s.change_membership(remove("PROMO_10")).await.unwrap();

  let err = s
    .execute_batch("UPDATE user_segment_history SET date_removed = '2030-01-01T00:00:00.000000Z'")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Database(_)));
}

// ─── Atomicity ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_history_insert_rolls_back_the_whole_batch() {
  let s = store().await;
  with_segments(&s, &["PROMO_10", "BROKEN_SEG"]).await;
  s.execute_batch(
    "CREATE TRIGGER inject_add_failure BEFORE INSERT ON user_segment_history
     WHEN NEW.segment_slug = 'BROKEN_SEG'
     BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
  )
  .await
  .unwrap();

  let batch = add("PROMO_10").with_add(MembershipAdd::new("BROKEN_SEG"));
  let err = s.change_membership(batch).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)));

  assert_eq!(s.count("SELECT COUNT(*) FROM users_segments").await.unwrap(), 0);
  assert_eq!(s.count("SELECT COUNT(*) FROM user_segment_history").await.unwrap(), 0);
}

#[tokio::test]
async fn failed_history_close_rolls_back_the_whole_batch() {
  let s = store().await;
  with_segments(&s, &["PROMO_10", "VOICE_MSG"]).await;
  s.change_membership(add("PROMO_10")).await.unwrap();
  s.execute_batch(
    "CREATE TRIGGER inject_close_failure BEFORE UPDATE ON user_segment_history
     WHEN NEW.segment_slug = 'PROMO_10'
     BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
  )
  .await
  .unwrap();

  let batch = add("VOICE_MSG").with_remove("PROMO_10");
  let err = s.change_membership(batch).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)));

  assert_eq!(slugs(&s.active_memberships(42).await.unwrap()), ["PROMO_10"]);
  assert_eq!(s.count("SELECT COUNT(*) FROM user_segment_history").await.unwrap(), 1);
  let open = s
    .count("SELECT COUNT(*) FROM user_segment_history WHERE date_removed IS NULL")
    .await
    .unwrap();
  assert_eq!(open, 1);
}

#[tokio::test]
async fn storage_failures_classify_as_opaque() {
  let s = store().await;
  with_segments(&s, &["PROMO_10"]).await;
  s.execute_batch(
    "CREATE TRIGGER inject_any_failure BEFORE INSERT ON users_segments
     BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
  )
  .await
  .unwrap();

  let err: Core = s.change_membership(add("PROMO_10")).await.unwrap_err().into();
  assert!(matches!(err, Core::Storage(_)));
}

// ─── History window ──────────────────────────────────────────────────────────

#[tokio::test]
async fn history_window_is_inclusive_by_day() {
  let (s, clock) = clocked_store().await;
  with_segments(&s, &["PROMO_10", "VOICE_MSG"]).await;

  // 10 May 12:00: add PROMO_10.
  s.change_membership(add("PROMO_10")).await.unwrap();
  // 12 May 23:59: add VOICE_MSG.
  clock.set_time(Utc.with_ymd_and_hms(2024, 5, 12, 23, 59, 0).unwrap());
  s.change_membership(add("VOICE_MSG")).await.unwrap();
  // 15 May: remove PROMO_10.
  clock.set_time(Utc.with_ymd_and_hms(2024, 5, 15, 8, 0, 0).unwrap());
  s.change_membership(remove("PROMO_10")).await.unwrap();

  let events = s.history(42, may(11, 12)).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].slug, "VOICE_MSG");

  let events = s.history(42, may(13, 20)).await.unwrap();
  let ops: Vec<_> = events.iter().map(|e| (e.slug.as_str(), e.operation)).collect();
  assert_eq!(ops, vec![("PROMO_10", Operation::Remove)]);

  assert_eq!(s.history(42, may(10, 15)).await.unwrap().len(), 3);

  let err = s.history(42, may(1, 9)).await.unwrap_err();
  assert!(matches!(err, Error::Core(Core::NoHistoryData(42))));
}

// ─── Export ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn export_writes_sorted_csv_artifact() {
  let (s, clock) = clocked_store().await;
  with_segments(&s, &["PROMO_10", "VOICE_MSG"]).await;

  s.change_membership(add("PROMO_10")).await.unwrap();
  clock.advance(TimeDelta::hours(1));
  s.change_membership(add("VOICE_MSG")).await.unwrap();
  clock.advance(TimeDelta::hours(1));
  s.change_membership(remove("PROMO_10")).await.unwrap();

  let dir = tempfile::tempdir().unwrap();
  let exporter = HistoryExporter::new(dir.path());
  let locator = exporter.export(&s, 42, may(1, 31)).await.unwrap();
  assert_eq!(locator.as_str(), "42/2024-05-01/2024-05-31/history.csv");

  let csv = std::fs::read_to_string(exporter.resolve(&locator)).unwrap();
  assert_eq!(
    csv,
    "42,PROMO_10,add,2024-05-10T12:00:00Z\n\
     42,VOICE_MSG,add,2024-05-10T13:00:00Z\n\
     42,PROMO_10,remove,2024-05-10T14:00:00Z\n"
  );
}

#[tokio::test]
async fn export_without_history_writes_nothing() {
  let s = store().await;
  let dir = tempfile::tempdir().unwrap();
  let exporter = HistoryExporter::new(dir.path());

  let err = exporter.export(&s, 42, may(1, 31)).await.unwrap_err();
  assert!(matches!(err, Core::NoHistoryData(42)));
  assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
