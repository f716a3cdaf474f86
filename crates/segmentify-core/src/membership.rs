//! Memberships: which users currently hold which segments.
//!
//! A membership row exists only while it is active. Explicit removal deletes
//! it; an elapsed `expires_at` hides it from reads without touching the row or
//! the history.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, Violation};

/// External user identifier. Users are not stored; they exist only through
/// their memberships.
pub type UserId = i64;

// ─── Read model ──────────────────────────────────────────────────────────────

/// The read model returned to callers: the slug only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveMembership {
  pub slug: String,
}

// ─── Batch input ─────────────────────────────────────────────────────────────

/// One segment to grant in a [`MembershipChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipAdd {
  pub slug:       String,
  pub expires_at: Option<DateTime<Utc>>,
}

impl MembershipAdd {
  /// A membership that never expires.
  pub fn new(slug: impl Into<String>) -> Self {
    Self { slug: slug.into(), expires_at: None }
  }

  /// A membership that stops being active at `expires_at`.
  pub fn until(slug: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
    Self { slug: slug.into(), expires_at: Some(expires_at) }
  }
}

/// Input to [`crate::store::SegmentStore::change_membership`]: a batch of
/// segments to grant and revoke for one user, applied all-or-nothing.
#[derive(Debug, Clone)]
pub struct MembershipChange {
  pub user_id: UserId,
  pub add:     Vec<MembershipAdd>,
  pub remove:  Vec<String>,
}

impl MembershipChange {
  pub fn new(user_id: UserId) -> Self {
    Self { user_id, add: Vec::new(), remove: Vec::new() }
  }

  pub fn with_add(mut self, add: MembershipAdd) -> Self {
    self.add.push(add);
    self
  }

  pub fn with_remove(mut self, slug: impl Into<String>) -> Self {
    self.remove.push(slug.into());
    self
  }

  pub fn added_slugs(&self) -> impl Iterator<Item = &str> {
    self.add.iter().map(|a| a.slug.as_str())
  }

  /// Conflicts inside the batch itself, independent of stored state.
  ///
  /// A slug may appear at most once across both lists; the outcome of adding
  /// and removing the same segment in one call is not defined, so such a
  /// batch is refused.
  pub fn conflicts(&self) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut added = HashSet::new();
    for slug in self.added_slugs() {
      if !added.insert(slug) {
        violations.push(Violation::Duplicate(slug.to_owned()));
      }
    }

    let mut removed = HashSet::new();
    for slug in &self.remove {
      if !removed.insert(slug.as_str()) {
        violations.push(Violation::Duplicate(slug.clone()));
      }
    }

    // BTreeSet keeps the report order stable.
    let both: BTreeSet<&str> = added.intersection(&removed).copied().collect();
    violations.extend(both.into_iter().map(|s| Violation::AddedAndRemoved(s.to_owned())));

    violations
  }

  /// Check the batch against the user's currently active slugs: every added
  /// slug must be absent and every removed slug must be present.
  pub fn violations_against(&self, active: &HashSet<String>) -> Vec<Violation> {
    let already = self
      .added_slugs()
      .filter(|s| active.contains(*s))
      .map(|s| Violation::AlreadyActive(s.to_owned()));
    let missing = self
      .remove
      .iter()
      .filter(|s| !active.contains(s.as_str()))
      .map(|s| Violation::NotActive(s.clone()));
    already.chain(missing).collect()
  }

  /// Run both checks and fold every violation into one
  /// [`Error::IncorrectRequest`].
  pub fn validate(&self, active: &HashSet<String>) -> Result<()> {
    let mut violations = self.conflicts();
    violations.extend(self.violations_against(active));
    if violations.is_empty() {
      Ok(())
    } else {
      Err(Error::IncorrectRequest(violations))
    }
  }
}
