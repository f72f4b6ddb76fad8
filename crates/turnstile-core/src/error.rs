//! Error types for `turnstile-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid idempotency key: {0}")]
  InvalidIdempotencyKey(String),

  #[error("invalid route template: {0}")]
  InvalidRouteTemplate(String),

  /// The credited source event has not actually happened yet.
  #[error("cannot credit a session that is not completed")]
  SessionNotCompleted,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
