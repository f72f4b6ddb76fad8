//! HTTP request boundary for Turnstile.
//!
//! Exposes an axum [`Router`] whose mutating endpoints run under the
//! coordination guard: clients declare an `Idempotency-Key` header and
//! retries are served the original response instead of re-executing.
//! Backed by any store implementing the core traits.

pub mod error;
pub mod extract;
pub mod guard;
pub mod handlers;
pub mod scheduler;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, routing::post};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use turnstile_core::{
  scheduler::FollowUpScheduler,
  store::{CoordinationStore, RewardLedger},
};

// ─── Store bound ─────────────────────────────────────────────────────────────

/// Everything the request boundary needs from a storage backend.
pub trait RequestStores:
  CoordinationStore + RewardLedger + Clone + Send + Sync + 'static
{
}

impl<S> RequestStores for S where
  S: CoordinationStore + RewardLedger + Clone + Send + Sync + 'static
{
}

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  /// Prefix under which the router is mounted; part of every canonical
  /// route, hence part of every natural key.
  #[serde(default)]
  pub base_path:  String,
  pub store_path: PathBuf,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S> {
  pub store:     Arc<S>,
  pub scheduler: Arc<dyn FollowUpScheduler>,
  pub config:    Arc<ServerConfig>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build an axum [`Router`] for the coordination service.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: RequestStores,
{
  Router::new()
    .route(handlers::register::ROUTE, post(handlers::register::create::<S>))
    .route(
      handlers::activities::ROUTE,
      post(handlers::activities::complete::<S>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  use turnstile_core::{
    fingerprint::Fingerprint,
    key::{IdempotencyKey, RouteTemplate},
    record::NaturalKey,
    scheduler::{FollowUp, FollowUpScheduler},
    store::CoordinationStore,
  };
  use turnstile_store_sqlite::SqliteStore;

  use super::*;

  // Captures scheduled jobs so tests can count business-logic executions.
  #[derive(Default)]
  struct RecordingScheduler(Mutex<Vec<FollowUp>>);

  impl RecordingScheduler {
    fn jobs(&self) -> Vec<FollowUp> { self.0.lock().unwrap().clone() }
  }

  impl FollowUpScheduler for RecordingScheduler {
    fn schedule(&self, job: FollowUp) { self.0.lock().unwrap().push(job); }
  }

  async fn make_state() -> (AppState<SqliteStore>, Arc<RecordingScheduler>) {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let scheduler = Arc::new(RecordingScheduler::default());

    let state = AppState {
      store:     Arc::new(store),
      scheduler: scheduler.clone(),
      config:    Arc::new(ServerConfig {
        host:       "127.0.0.1".to_string(),
        port:       8080,
        base_path:  String::new(),
        store_path: PathBuf::from(":memory:"),
      }),
    };
    (state, scheduler)
  }

  async fn oneshot_raw(
    state:   AppState<SqliteStore>,
    uri:     &str,
    headers: Vec<(&str, &str)>,
    body:    Value,
  ) -> axum::response::Response {
    let mut builder = Request::builder()
      .method("POST")
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json");
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    router(state).oneshot(req).await.unwrap()
  }

  async fn body_string(res: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
  }

  fn code_of(body: &str) -> String {
    let v: Value = serde_json::from_str(body).unwrap();
    v["code"].as_str().unwrap_or_default().to_string()
  }

  // ── New then replay ─────────────────────────────────────────────────────────

  #[tokio::test]
  async fn registration_new_then_replay() {
    let (state, scheduler) = make_state().await;
    let headers = vec![("x-actor-id", "u1"), ("idempotency-key", "abc")];
    let payload = json!({"email": "a@b.com"});

    let first = oneshot_raw(state.clone(), "/api/registrations", headers.clone(), payload.clone()).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(
      first.headers().get("idempotency-key").unwrap().to_str().unwrap(),
      "abc"
    );
    assert!(first.headers().get("idempotency-replayed").is_none());
    let first_body = body_string(first).await;
    assert!(first_body.contains("registration accepted"), "body: {first_body}");

    let second = oneshot_raw(state, "/api/registrations", headers, payload).await;
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    assert_eq!(
      second.headers().get("idempotency-replayed").unwrap().to_str().unwrap(),
      "true"
    );
    let second_body = body_string(second).await;
    assert_eq!(second_body, first_body);

    // The underlying registration side effect ran exactly once.
    assert_eq!(scheduler.jobs().len(), 1);
  }

  // ── Fingerprint mismatch ────────────────────────────────────────────────────

  #[tokio::test]
  async fn key_reuse_with_different_payload_is_409() {
    let (state, _) = make_state().await;
    let headers = vec![("x-actor-id", "u1"), ("idempotency-key", "abc")];

    oneshot_raw(state.clone(), "/api/registrations", headers.clone(), json!({"email": "a@b.com"})).await;
    let second = oneshot_raw(state, "/api/registrations", headers, json!({"email": "x@y.com"})).await;

    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(code_of(&body_string(second).await), "key_reuse_mismatch");
  }

  #[tokio::test]
  async fn null_field_and_absent_field_replay_identically() {
    let (state, _) = make_state().await;
    let headers = vec![("x-actor-id", "u1"), ("idempotency-key", "abc")];

    oneshot_raw(
      state.clone(),
      "/api/registrations",
      headers.clone(),
      json!({"email": "a@b.com", "referrer": null}),
    )
    .await;
    let second =
      oneshot_raw(state, "/api/registrations", headers, json!({"email": "a@b.com"})).await;

    assert_eq!(second.status(), StatusCode::ACCEPTED);
    assert!(second.headers().get("idempotency-replayed").is_some());
  }

  // ── Key validation boundaries ───────────────────────────────────────────────

  #[tokio::test]
  async fn key_of_200_chars_is_accepted() {
    let (state, _) = make_state().await;
    let key = "k".repeat(200);
    let res = oneshot_raw(
      state,
      "/api/registrations",
      vec![("x-actor-id", "u1"), ("idempotency-key", &key)],
      json!({"email": "a@b.com"}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
  }

  #[tokio::test]
  async fn key_of_201_chars_is_rejected() {
    let (state, _) = make_state().await;
    let key = "k".repeat(201);
    let res = oneshot_raw(
      state,
      "/api/registrations",
      vec![("x-actor-id", "u1"), ("idempotency-key", &key)],
      json!({"email": "a@b.com"}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&body_string(res).await), "invalid_idempotency_key");
  }

  #[tokio::test]
  async fn all_whitespace_key_is_rejected() {
    let (state, _) = make_state().await;
    let res = oneshot_raw(
      state,
      "/api/registrations",
      vec![("x-actor-id", "u1"), ("idempotency-key", "   ")],
      json!({"email": "a@b.com"}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn missing_key_runs_uncoordinated() {
    let (state, scheduler) = make_state().await;
    let headers = vec![("x-actor-id", "u1")];
    let payload = json!({"email": "a@b.com"});

    let first = oneshot_raw(state.clone(), "/api/registrations", headers.clone(), payload.clone()).await;
    let second = oneshot_raw(state.clone(), "/api/registrations", headers, payload).await;

    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    // No coordination: nothing echoed, nothing replayed, handler ran twice.
    assert!(first.headers().get("idempotency-key").is_none());
    assert!(second.headers().get("idempotency-replayed").is_none());
    assert_eq!(scheduler.jobs().len(), 2);

    // And no idempotency record was ever created: reaping every pending
    // record, however young, finds nothing.
    let reaped = state
      .store
      .reap_stale_pending(chrono::Duration::seconds(-1))
      .await
      .unwrap();
    assert_eq!(reaped, 0);
  }

  #[tokio::test]
  async fn coordinated_request_without_actor_is_rejected() {
    let (state, _) = make_state().await;
    let res = oneshot_raw(
      state,
      "/api/registrations",
      vec![("idempotency-key", "abc")],
      json!({"email": "a@b.com"}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&body_string(res).await), "missing_actor");
  }

  #[tokio::test]
  async fn malformed_payload_is_rejected_without_coordination() {
    let (state, scheduler) = make_state().await;
    let res = oneshot_raw(
      state,
      "/api/registrations",
      vec![("x-actor-id", "u1"), ("idempotency-key", "abc")],
      json!({"not_email": true}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(scheduler.jobs().is_empty());
  }

  // ── In-flight duplicates ────────────────────────────────────────────────────

  #[tokio::test]
  async fn duplicate_of_in_flight_request_is_rejected() {
    let (state, scheduler) = make_state().await;
    let payload = json!({"email": "a@b.com"});

    // Seed a pending record exactly as the guard would create it.
    let natural_key = NaturalKey {
      actor_id: "u1".to_string(),
      method:   "POST".to_string(),
      route:    RouteTemplate::canonicalize("", handlers::register::ROUTE).unwrap(),
      key:      IdempotencyKey::parse("abc").unwrap(),
    };
    state
      .store
      .begin(natural_key, Fingerprint::compute(&payload))
      .await
      .unwrap();

    let res = oneshot_raw(
      state,
      "/api/registrations",
      vec![("x-actor-id", "u1"), ("idempotency-key", "abc")],
      payload,
    )
    .await;

    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(res.headers().get(header::RETRY_AFTER).unwrap(), "1");
    assert_eq!(code_of(&body_string(res).await), "request_in_flight");
    // The handler never ran.
    assert!(scheduler.jobs().is_empty());
  }

  // ── Reward crediting through the boundary ───────────────────────────────────

  fn session_payload(effort: i64) -> Value {
    json!({
      "state":           "completed",
      "perceivedEffort": effort,
      "distanceKm":      5.0,
    })
  }

  #[tokio::test]
  async fn completing_a_session_awards_points_once() {
    let (state, scheduler) = make_state().await;

    let first = oneshot_raw(
      state.clone(),
      "/api/activities/s1/complete",
      vec![("x-actor-id", "u1"), ("idempotency-key", "k1")],
      session_payload(5),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_body: Value =
      serde_json::from_str(&body_string(first).await).unwrap();
    assert_eq!(first_body["awarded"], json!(true));
    assert_eq!(first_body["pointsAwarded"], json!(100));

    // A different idempotency key, drifted inputs, same session: the event
    // identity protects the credit even though the request is "new".
    let second = oneshot_raw(
      state,
      "/api/activities/s1/complete",
      vec![("x-actor-id", "u1"), ("idempotency-key", "k2")],
      session_payload(10),
    )
    .await;
    assert_eq!(second.status(), StatusCode::OK);
    let second_body: Value =
      serde_json::from_str(&body_string(second).await).unwrap();
    assert_eq!(second_body["awarded"], json!(false));
    assert_eq!(second_body["pointsAwarded"], json!(100));

    // Exactly one streak recalculation was handed off.
    let streaks = scheduler
      .jobs()
      .into_iter()
      .filter(|j| matches!(j, FollowUp::RecalculateStreak { .. }))
      .count();
    assert_eq!(streaks, 1);
  }

  #[tokio::test]
  async fn replayed_session_completion_serves_stored_body() {
    let (state, _) = make_state().await;
    let headers = vec![("x-actor-id", "u1"), ("idempotency-key", "k1")];

    let first = oneshot_raw(
      state.clone(),
      "/api/activities/s1/complete",
      headers.clone(),
      session_payload(5),
    )
    .await;
    let first_body = body_string(first).await;

    let second = oneshot_raw(
      state,
      "/api/activities/s1/complete",
      headers,
      session_payload(5),
    )
    .await;
    assert!(second.headers().get("idempotency-replayed").is_some());
    assert_eq!(body_string(second).await, first_body);
  }

  #[tokio::test]
  async fn crediting_an_incomplete_session_is_rejected() {
    let (state, scheduler) = make_state().await;
    let res = oneshot_raw(
      state,
      "/api/activities/s1/complete",
      vec![("x-actor-id", "u1"), ("idempotency-key", "k1")],
      json!({
        "state":           "in_progress",
        "perceivedEffort": 5,
        "distanceKm":      5.0,
      }),
    )
    .await;

    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(code_of(&body_string(res).await), "session_not_completed");
    assert!(scheduler.jobs().is_empty());
  }
}
