//! The coordination guard — wraps a mutating handler in the
//! validate → resolve → execute-or-replay → persist sequence.
//!
//! A request without an idempotency key runs uncoordinated: the handler
//! executes and no record is created. With a key, the wrapped handler runs
//! at most once per natural key; duplicates are served the persisted
//! response verbatim with a replay marker, and duplicates racing an
//! in-flight original are rejected without executing anything.

use std::future::Future;

use axum::{
  Json,
  http::{HeaderMap, HeaderValue, Method, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::Value;

use turnstile_core::{
  fingerprint::Fingerprint,
  key::{IdempotencyKey, RouteTemplate},
  record::NaturalKey,
  resolution::{Resolution, ResolveError, resolve},
  store::CoordinationStore,
};

use crate::{
  AppState, RequestStores,
  error::Error,
  extract::{IDEMPOTENCY_KEY_HEADER, IDEMPOTENCY_REPLAYED_HEADER},
};

/// Run `handler` under request coordination.
///
/// `route_template` must be the *matched route template* (e.g.
/// `/api/activities/{session_id}/complete`), never the literal request path.
/// The handler's `(status, body)` outcome is persisted before the response
/// leaves, so any later duplicate replays it byte-for-byte.
pub async fn coordinated<S, F, Fut>(
  state: &AppState<S>,
  headers: &HeaderMap,
  method: &Method,
  route_template: &str,
  payload: &Value,
  handler: F,
) -> Result<Response, Error>
where
  S: RequestStores,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<(StatusCode, Value), Error>>,
{
  let raw_key = crate::extract::idempotency_key(headers);
  let Some(key) = IdempotencyKey::from_header(raw_key)? else {
    // No key declared: execute without coordination.
    let (status, body) = handler().await?;
    return Ok((status, Json(body)).into_response());
  };

  let route = RouteTemplate::canonicalize(&state.config.base_path, route_template)?;
  let natural_key = NaturalKey {
    actor_id: crate::extract::actor_id(headers)?,
    method:   method.as_str().to_string(),
    route,
    key:      key.clone(),
  };
  let fingerprint = Fingerprint::compute(payload);

  match resolve(&*state.store, &natural_key, &fingerprint).await {
    Ok(Resolution::Fresh { record_id }) => {
      let (status, body) = handler().await?;
      let body_str = body.to_string();
      state
        .store
        .complete(record_id, status.as_u16(), body_str.clone())
        .await
        .map_err(|e| Error::Store(Box::new(e)))?;

      Ok(with_key_echo(
        (
          status,
          [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
          body_str,
        )
          .into_response(),
        &key,
      ))
    }

    Ok(Resolution::Replay(stored)) => {
      let status = StatusCode::from_u16(stored.status)
        .map_err(|e| Error::Store(Box::new(e)))?;
      let mut res = (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        stored.body,
      )
        .into_response();
      res.headers_mut().insert(
        IDEMPOTENCY_REPLAYED_HEADER,
        HeaderValue::from_static("true"),
      );
      Ok(with_key_echo(res, &key))
    }

    Ok(Resolution::InFlight) => {
      Ok(with_key_echo(Error::RequestInFlight.into_response(), &key))
    }

    Err(ResolveError::KeyReuseMismatch) => {
      Ok(with_key_echo(Error::KeyReuseMismatch.into_response(), &key))
    }

    Err(ResolveError::StateError { key: natural }) => {
      tracing::error!(natural_key = %natural, "coordination state lost");
      Ok(with_key_echo(Error::State.into_response(), &key))
    }

    Err(ResolveError::Store(e)) => Err(Error::Store(Box::new(e))),
  }
}

/// Echo the idempotency key back on every coordinated response, success or
/// failure, so clients and observability tooling can correlate retries.
fn with_key_echo(mut res: Response, key: &IdempotencyKey) -> Response {
  if let Ok(value) = HeaderValue::from_str(key.as_str()) {
    res.headers_mut().insert(IDEMPOTENCY_KEY_HEADER, value);
  }
  res
}
