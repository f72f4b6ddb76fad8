//! Idempotency-record types — the unit of request coordination.
//!
//! A record represents one attempted invocation of a mutating operation.
//! It is created with empty response fields when the natural key is first
//! seen, mutated exactly once when the original handler finishes, and never
//! deleted by the coordination layer itself (stale-record reaping is a
//! maintenance concern).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  fingerprint::Fingerprint,
  key::{IdempotencyKey, RouteTemplate},
};

// ─── Natural key ─────────────────────────────────────────────────────────────

/// The business-meaningful composite key identifying one logical request
/// intent: who, doing what, where, under which client-declared key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
  pub actor_id: String,
  /// Uppercase HTTP method name, e.g. `POST`.
  pub method:   String,
  pub route:    RouteTemplate,
  pub key:      IdempotencyKey,
}

impl std::fmt::Display for NaturalKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} {} {} key={}",
      self.actor_id, self.method, self.route, self.key
    )
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// The response persisted against a completed record, replayed verbatim for
/// duplicate requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
  pub status: u16,
  pub body:   String,
}

/// One attempted invocation of a coordinated operation.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
  pub id:           Uuid,
  pub key:          NaturalKey,
  pub request_hash: Fingerprint,
  /// `None` while the original execution is still in flight.
  pub response:     Option<StoredResponse>,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}
