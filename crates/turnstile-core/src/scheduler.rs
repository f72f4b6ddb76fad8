//! Fire-and-forget hand-off of follow-on asynchronous work.
//!
//! Scheduled only after the side effect that motivates it has committed, so
//! follow-on work is never queued for a rolled-back credit. Delivery is
//! at-least-once; consumers must tolerate duplicates.

use serde::{Deserialize, Serialize};

/// A unit of follow-on work handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FollowUp {
  /// Recompute an actor's activity streak after a fresh credit.
  RecalculateStreak { actor_id: String },
  /// Deliver a notification to an actor.
  SendNotification { actor_id: String, message: String },
}

/// Hands follow-up jobs to whatever executes them. Fire-and-forget: the
/// caller never waits on the outcome.
pub trait FollowUpScheduler: Send + Sync {
  fn schedule(&self, job: FollowUp);
}
