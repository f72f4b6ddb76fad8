//! Handler for `POST /api/registrations`.
//!
//! The registration itself is deliberately thin — the endpoint exists to
//! exercise the coordination guard end to end: accepted registrations hand a
//! welcome notification to the follow-up scheduler exactly once per
//! idempotency key.

use axum::{
  extract::State,
  http::{HeaderMap, Method, StatusCode},
  response::Response,
  Json,
};
use serde::Deserialize;
use serde_json::{Value, json};

use turnstile_core::scheduler::FollowUp;

use crate::{AppState, RequestStores, error::Error, extract, guard};

/// Matched route template; part of the natural key, so it must stay in sync
/// with the router.
pub const ROUTE: &str = "/api/registrations";

#[derive(Debug, Deserialize)]
struct RegistrationBody {
  email: String,
}

/// `POST /api/registrations` — body: `{"email":"a@b.com"}`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  method: Method,
  headers: HeaderMap,
  Json(payload): Json<Value>,
) -> Result<Response, Error>
where
  S: RequestStores,
{
  // Validate the payload shape once, at the boundary.
  let body: RegistrationBody = serde_json::from_value(payload.clone())
    .map_err(|e| Error::BadRequest(e.to_string()))?;

  guard::coordinated(&state, &headers, &method, ROUTE, &payload, || async {
    let actor_id = extract::actor_id(&headers)?;
    state.scheduler.schedule(FollowUp::SendNotification {
      actor_id,
      message: format!("Welcome! A confirmation was sent to {}.", body.email),
    });

    Ok((
      StatusCode::ACCEPTED,
      json!({ "message": "registration accepted" }),
    ))
  })
  .await
}
