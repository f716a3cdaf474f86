//! Time source used for membership expiry and history timestamps.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A manually driven clock for tests.
#[derive(Debug)]
pub struct MockClock {
  now: RwLock<DateTime<Utc>>,
}

impl MockClock {
  pub fn with_time(time: DateTime<Utc>) -> Self {
    Self { now: RwLock::new(time) }
  }

  pub fn advance(&self, delta: TimeDelta) {
    let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
    *now += delta;
  }

  pub fn set_time(&self, time: DateTime<Utc>) {
    *self.now.write().unwrap_or_else(PoisonError::into_inner) = time;
  }
}

impl Clock for MockClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.read().unwrap_or_else(PoisonError::into_inner)
  }
}
