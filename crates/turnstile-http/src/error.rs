//! Error types and axum `IntoResponse` implementation.
//!
//! Every error response carries a stable machine-readable `code` alongside
//! the human-readable message.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid idempotency key: {0}")]
  InvalidIdempotencyKey(String),

  #[error("invalid route template: {0}")]
  InvalidRouteTemplate(String),

  #[error("missing {0} header")]
  MissingActor(&'static str),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("idempotency key reused with a different request payload")]
  KeyReuseMismatch,

  #[error("an identical request is currently in flight")]
  RequestInFlight,

  #[error("cannot credit a session that is not completed")]
  SessionNotCompleted,

  #[error("coordination state error")]
  State,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Stable machine-readable code for the response body.
  fn code(&self) -> &'static str {
    match self {
      Error::InvalidIdempotencyKey(_) => "invalid_idempotency_key",
      Error::InvalidRouteTemplate(_) => "invalid_route_template",
      Error::MissingActor(_) => "missing_actor",
      Error::BadRequest(_) => "bad_request",
      Error::KeyReuseMismatch => "key_reuse_mismatch",
      Error::RequestInFlight => "request_in_flight",
      Error::SessionNotCompleted => "session_not_completed",
      Error::State => "coordination_state_error",
      Error::Store(_) => "store_error",
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Error::InvalidIdempotencyKey(_)
      | Error::InvalidRouteTemplate(_)
      | Error::MissingActor(_)
      | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
      Error::KeyReuseMismatch
      | Error::RequestInFlight
      | Error::SessionNotCompleted => StatusCode::CONFLICT,
      Error::State | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<turnstile_core::Error> for Error {
  fn from(e: turnstile_core::Error) -> Self {
    match e {
      turnstile_core::Error::InvalidIdempotencyKey(msg) => {
        Error::InvalidIdempotencyKey(msg)
      }
      turnstile_core::Error::InvalidRouteTemplate(msg) => {
        Error::InvalidRouteTemplate(msg)
      }
      turnstile_core::Error::SessionNotCompleted => Error::SessionNotCompleted,
      turnstile_core::Error::Serialization(e) => Error::BadRequest(e.to_string()),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let body = json!({ "error": self.to_string(), "code": self.code() });
    let mut res = (self.status(), Json(body)).into_response();

    if matches!(self, Error::RequestInFlight) {
      res
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    }
    res
  }
}
