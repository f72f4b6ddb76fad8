//! Tokio-backed follow-up scheduler.
//!
//! Hand-off is fire-and-forget onto the runtime; the downstream executors
//! (streak recalculation, notification delivery) are external collaborators
//! reached at-least-once, so this end only records the hand-off.

use turnstile_core::scheduler::{FollowUp, FollowUpScheduler};

/// Schedules follow-up jobs as detached tokio tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl FollowUpScheduler for TokioScheduler {
  fn schedule(&self, job: FollowUp) {
    tokio::spawn(async move {
      match job {
        FollowUp::RecalculateStreak { actor_id } => {
          tracing::info!(%actor_id, "follow-up: recalculate streak");
        }
        FollowUp::SendNotification { actor_id, message } => {
          tracing::info!(%actor_id, %message, "follow-up: send notification");
        }
      }
    });
  }
}
