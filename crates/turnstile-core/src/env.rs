//! Injected clock and id-generation seams.
//!
//! The coordination core never calls the wall clock or a UUID generator
//! directly; stores take these as trait objects so tests can freeze time and
//! control generated identifiers.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Source of the current instant.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Source of generated record identifiers.
pub trait IdSource: Send + Sync {
  fn next_id(&self) -> Uuid;
}

// ─── Production implementations ──────────────────────────────────────────────

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
  fn next_id(&self) -> Uuid { Uuid::new_v4() }
}

// ─── Test doubles ────────────────────────────────────────────────────────────

/// A clock frozen at a fixed instant. Intended for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { self.0 }
}

/// Hands out ids from a predetermined list, then falls back to random ones.
/// Intended for tests.
#[derive(Debug, Default)]
pub struct SequenceIds {
  queue: Mutex<Vec<Uuid>>,
}

impl SequenceIds {
  pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
    let mut queue: Vec<Uuid> = ids.into_iter().collect();
    queue.reverse();
    Self { queue: Mutex::new(queue) }
  }
}

impl IdSource for SequenceIds {
  fn next_id(&self) -> Uuid {
    self
      .queue
      .lock()
      .expect("id queue poisoned")
      .pop()
      .unwrap_or_else(Uuid::new_v4)
  }
}
