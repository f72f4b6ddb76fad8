//! The storage traits and supporting types.
//!
//! Implemented by storage backends (e.g. `turnstile-store-sqlite`). Higher
//! layers (`turnstile-http`) depend on these abstractions, not on any
//! concrete backend.
//!
//! The only mutual-exclusion mechanism in the whole system is the store's
//! uniqueness constraints, so both write paths are *single* atomic round
//! trips — never a separate read followed by a write, which would be racy
//! across processes.

use std::future::Future;

use chrono::Duration;
use uuid::Uuid;

use crate::{
  fingerprint::Fingerprint,
  record::{IdempotencyRecord, NaturalKey},
  reward::{CreditOutcome, RewardClaim},
};

// ─── Coordination ────────────────────────────────────────────────────────────

/// Result of the atomic insert-or-fetch that opens a coordinated request.
#[derive(Debug)]
pub enum Begun {
  /// No record existed; one was created. The id is the caller's handle for
  /// the later [`CoordinationStore::complete`] call.
  Inserted(Uuid),
  /// A record with the same natural key already exists.
  Existing(IdempotencyRecord),
  /// The insert hit the uniqueness constraint but the conflicting row could
  /// not be fetched — a narrow race the resolution engine retries once.
  Vanished,
}

/// Abstraction over idempotency-record storage.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CoordinationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert a new record for `key` with `fingerprint`, or fetch the
  /// existing one, in a single atomic step against the store's uniqueness
  /// constraint.
  fn begin(
    &self,
    key: NaturalKey,
    fingerprint: Fingerprint,
  ) -> impl Future<Output = Result<Begun, Self::Error>> + Send + '_;

  /// Persist the final response against a record obtained from
  /// [`Begun::Inserted`]. Last write wins; persisting twice overwrites.
  fn complete(
    &self,
    record_id: Uuid,
    status: u16,
    body: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete records older than `max_age` that never received a response —
  /// abandoned by callers that crashed between `begin` and `complete`.
  /// Returns the number of records reaped.
  fn reap_stale_pending(
    &self,
    max_age: Duration,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

// ─── Reward ledger ───────────────────────────────────────────────────────────

/// Abstraction over the exactly-once side-effect ledger.
pub trait RewardLedger: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Credit a reward for the claim's `(actor, source_type, source_id)`
  /// triple, at most once, inside a single transaction: an existing ledger
  /// row is returned with `awarded = false` and its stored amount, without
  /// recomputation; otherwise the amount is computed, recorded, and
  /// returned with `awarded = true`. Both paths re-stamp the actor's
  /// denormalized total.
  fn credit_once(
    &self,
    claim: RewardClaim,
  ) -> impl Future<Output = Result<CreditOutcome, Self::Error>> + Send + '_;

  /// Current denormalized total for an actor; zero when never credited.
  fn total_points<'a>(
    &'a self,
    actor_id: &'a str,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + 'a;
}
