//! The resolution engine — decides what a coordinated request *is*.
//!
//! Given a natural key and a payload fingerprint, [`resolve`] classifies the
//! request as brand new, a replay of a completed one, a duplicate racing
//! with an in-flight one, or a client protocol violation. The store's
//! uniqueness constraint is the only arbiter; the engine itself holds no
//! locks and is safe to run on any number of concurrent processes.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  fingerprint::Fingerprint,
  record::{NaturalKey, StoredResponse},
  store::{Begun, CoordinationStore},
};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// How a coordinated request resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  /// First time this natural key has been seen. The caller must execute the
  /// handler and persist its outcome against `record_id`.
  Fresh { record_id: Uuid },
  /// The original execution already finished; serve the stored response
  /// verbatim and do not re-execute.
  Replay(StoredResponse),
  /// Another invocation with the identical key is currently in flight (or
  /// crashed before persisting a result). The caller must not execute the
  /// handler; the boundary tells the client to retry shortly.
  InFlight,
}

/// A failed resolution.
#[derive(Debug, Error)]
pub enum ResolveError<E: std::error::Error> {
  /// The same natural key was reused with a different payload — a client
  /// protocol violation, not a race.
  #[error("idempotency key reused with a different request payload")]
  KeyReuseMismatch,

  /// The insert conflicted but no record could be located even after one
  /// retry. A server-side invariant violation; surfaced, never swallowed.
  #[error("coordination state lost for natural key [{key}]")]
  StateError { key: NaturalKey },

  #[error("store error: {0}")]
  Store(#[source] E),
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Resolve one coordinated request in a single logical step.
///
/// The insert-or-fetch round trip is atomic in the store; the narrow race
/// where a conflicting insert's follow-up fetch finds nothing (concurrent
/// reap between the two) is retried exactly once before giving up.
pub async fn resolve<S: CoordinationStore>(
  store: &S,
  key: &NaturalKey,
  fingerprint: &Fingerprint,
) -> Result<Resolution, ResolveError<S::Error>> {
  let mut vanished = 0;

  loop {
    let begun = store
      .begin(key.clone(), fingerprint.clone())
      .await
      .map_err(ResolveError::Store)?;

    match begun {
      Begun::Inserted(record_id) => return Ok(Resolution::Fresh { record_id }),

      Begun::Existing(record) => {
        if record.request_hash != *fingerprint {
          return Err(ResolveError::KeyReuseMismatch);
        }
        return match record.response {
          Some(response) => Ok(Resolution::Replay(response)),
          None => Ok(Resolution::InFlight),
        };
      }

      Begun::Vanished => {
        vanished += 1;
        if vanished > 1 {
          return Err(ResolveError::StateError { key: key.clone() });
        }
      }
    }
  }
}
