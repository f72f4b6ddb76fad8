//! Header extraction for the coordination boundary.

use axum::http::HeaderMap;

use crate::error::Error;

/// Request header carrying the client idempotency key. Header-name lookup is
/// case-insensitive per HTTP semantics.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Response header marking a response served from replay.
pub const IDEMPOTENCY_REPLAYED_HEADER: &str = "idempotency-replayed";

/// Request header carrying the acting user's id. Authentication itself is
/// upstream; this boundary only consumes the identity it is handed.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The raw idempotency-key header value, if any. Validation happens in
/// [`turnstile_core::key::IdempotencyKey`].
pub fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(IDEMPOTENCY_KEY_HEADER)
    .and_then(|v| v.to_str().ok())
}

/// The acting user's id; required on every coordinated endpoint.
pub fn actor_id(headers: &HeaderMap) -> Result<String, Error> {
  headers
    .get(ACTOR_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(str::to_string)
    .ok_or(Error::MissingActor(ACTOR_HEADER))
}
