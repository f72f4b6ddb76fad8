//! Handler for `POST /api/activities/{session_id}/complete`.
//!
//! Credits the one-time completion reward for an activity session. The
//! credit is exactly-once on the *event identity* — (actor, source type,
//! session id) — independent of whether the client declared an idempotency
//! key, so even uncoordinated retries cannot double-credit.

use axum::{
  extract::{Path, State},
  http::{HeaderMap, Method, StatusCode},
  response::Response,
  Json,
};
use serde::Deserialize;
use serde_json::{Value, json};

use turnstile_core::{
  reward::{ProfileSnapshot, RewardClaim, RewardInputs, SourceType, TrainingGoal},
  scheduler::FollowUp,
  store::RewardLedger,
};

use crate::{AppState, RequestStores, error::Error, extract, guard};

/// Matched route template; part of the natural key, so it must stay in sync
/// with the router.
pub const ROUTE: &str = "/api/activities/{session_id}/complete";

/// Where the session stands according to the client's tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SessionState {
  Completed,
  InProgress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody {
  state:            SessionState,
  perceived_effort: i64,
  distance_km:      f64,
  profile:          Option<ProfileBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileBody {
  goal:            Option<TrainingGoal>,
  date_of_birth:   Option<String>,
  weekly_sessions: Option<String>,
}

/// `POST /api/activities/{session_id}/complete`
pub async fn complete<S>(
  State(state): State<AppState<S>>,
  method: Method,
  Path(session_id): Path<String>,
  headers: HeaderMap,
  Json(payload): Json<Value>,
) -> Result<Response, Error>
where
  S: RequestStores,
{
  let body: CompleteBody = serde_json::from_value(payload.clone())
    .map_err(|e| Error::BadRequest(e.to_string()))?;

  guard::coordinated(&state, &headers, &method, ROUTE, &payload, || async {
    let actor_id = extract::actor_id(&headers)?;

    let claim = RewardClaim {
      actor_id:    actor_id.clone(),
      source_type: SourceType::SessionCompleted,
      source_id:   session_id.clone(),
      inputs:      RewardInputs {
        completed:        body.state == SessionState::Completed,
        perceived_effort: body.perceived_effort,
        distance_km:      body.distance_km,
        profile:          body.profile.map(|p| ProfileSnapshot {
          goal:            p.goal,
          date_of_birth:   p.date_of_birth,
          weekly_sessions: p.weekly_sessions,
        }),
      },
    };

    let outcome = state.store.credit_once(claim).await.map_err(|e| {
      if matches!(
        core_error(&e),
        Some(turnstile_core::Error::SessionNotCompleted)
      ) {
        Error::SessionNotCompleted
      } else {
        Error::Store(Box::new(e))
      }
    })?;

    // Only a committed fresh credit triggers follow-on work.
    if outcome.awarded {
      state
        .scheduler
        .schedule(FollowUp::RecalculateStreak { actor_id });
    }

    Ok((
      StatusCode::OK,
      json!({
        "rewardId":      outcome.reward_id,
        "pointsAwarded": outcome.points,
        "awarded":       outcome.awarded,
      }),
    ))
  })
  .await
}

/// Walk the error's source chain for a core domain error.
fn core_error<'a>(
  e: &'a (dyn std::error::Error + 'static),
) -> Option<&'a turnstile_core::Error> {
  let mut current: Option<&(dyn std::error::Error + 'static)> = Some(e);
  while let Some(err) = current {
    if let Some(core) = err.downcast_ref::<turnstile_core::Error>() {
      return Some(core);
    }
    current = err.source();
  }
  None
}
