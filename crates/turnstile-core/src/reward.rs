//! Activity-reward scoring — the worked example of an exactly-once side
//! effect.
//!
//! [`score`] is a pure function of the claim inputs and the current date.
//! Profile data is frequently missing or free-form, so every categorical
//! lookup defines an explicit default for unknown/absent input; the function
//! never fails on bad profile data, only on an incomplete session.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Bounds and weights ──────────────────────────────────────────────────────

/// Awarded for any completed session before adjustments.
const BASE_POINTS: i64 = 50;

/// Points per unit of (clamped) perceived effort.
const EFFORT_WEIGHT: i64 = 6;

/// Perceived effort is clamped into this range before use.
const EFFORT_RANGE: std::ops::RangeInclusive<i64> = 1..=10;

/// Points per kilometre, before the cap.
const DISTANCE_WEIGHT: f64 = 4.0;

/// Upper bound on the distance-derived term.
const DISTANCE_CAP: i64 = 60;

/// Final score bounds.
pub const MIN_POINTS: i64 = 10;
pub const MAX_POINTS: i64 = 250;

// ─── Claim inputs ────────────────────────────────────────────────────────────

/// The actor's stated training goal, as declared on their profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingGoal {
  Endurance,
  Strength,
  WeightLoss,
  General,
}

/// Profile data attached to a claim. Every field is optional: profiles are
/// user-maintained and routinely incomplete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSnapshot {
  pub goal:            Option<TrainingGoal>,
  /// ISO 8601 calendar date, kept as the raw string the profile holds.
  pub date_of_birth:   Option<String>,
  /// Free-form weekly session count, e.g. `"3"` or `"4 times"`.
  pub weekly_sessions: Option<String>,
}

/// Everything the scoring function needs, gathered by the caller before the
/// executor transaction opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardInputs {
  /// Whether the source session has actually been completed.
  pub completed:        bool,
  pub perceived_effort: i64,
  pub distance_km:      f64,
  pub profile:          Option<ProfileSnapshot>,
}

// ─── Claim / outcome ─────────────────────────────────────────────────────────

/// Kind of real-world event a side effect is credited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
  SessionCompleted,
}

/// A request to credit a one-time reward for a domain event. Keyed by the
/// identity of the event itself, independent of any client idempotency key.
#[derive(Debug, Clone)]
pub struct RewardClaim {
  pub actor_id:    String,
  pub source_type: SourceType,
  pub source_id:   String,
  pub inputs:      RewardInputs,
}

/// The outcome of a credit attempt. `awarded` is `true` only for the single
/// call that actually created the ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditOutcome {
  pub reward_id: Uuid,
  pub points:    i64,
  pub awarded:   bool,
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// Compute the points for a completed session.
///
/// Deterministic in `(inputs, today)`. Fails only when the session is not
/// completed; absent or unparseable profile data falls back to explicit
/// defaults.
pub fn score(inputs: &RewardInputs, today: NaiveDate) -> Result<i64> {
  if !inputs.completed {
    return Err(Error::SessionNotCompleted);
  }

  let effort = inputs
    .perceived_effort
    .clamp(*EFFORT_RANGE.start(), *EFFORT_RANGE.end());
  let effort_term = effort * EFFORT_WEIGHT;

  let distance_term =
    ((inputs.distance_km.max(0.0) * DISTANCE_WEIGHT).round() as i64).min(DISTANCE_CAP);

  let profile = inputs.profile.as_ref();

  let goal_adjustment = match profile.and_then(|p| p.goal) {
    Some(TrainingGoal::Endurance) => 15,
    Some(TrainingGoal::Strength) => 10,
    Some(TrainingGoal::WeightLoss) => 20,
    Some(TrainingGoal::General) => 5,
    None => 0,
  };

  let age_bonus = match profile
    .and_then(|p| p.date_of_birth.as_deref())
    .and_then(|raw| age_on(raw, today))
  {
    Some(age) if age < 18 => 0,
    Some(age) if age < 40 => 5,
    Some(age) if age < 60 => 15,
    Some(_) => 25,
    None => 0,
  };

  let multiplier = match profile
    .and_then(|p| p.weekly_sessions.as_deref())
    .and_then(parse_weekly_sessions)
  {
    Some(0..=1) => 1.2,
    Some(2..=3) => 1.0,
    Some(4..=5) => 0.9,
    Some(_) => 0.8,
    None => 1.0,
  };

  let unscaled = BASE_POINTS + effort_term + distance_term + goal_adjustment + age_bonus;
  let scaled = (unscaled as f64 * multiplier).round() as i64;

  Ok(scaled.clamp(MIN_POINTS, MAX_POINTS))
}

/// Whole years between `raw` (an ISO 8601 date) and `today`. `None` when the
/// date does not parse or lies in the future.
fn age_on(raw: &str, today: NaiveDate) -> Option<u32> {
  let dob = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
  if dob > today {
    return None;
  }

  let mut age = today.year() - dob.year();
  if (today.month(), today.day()) < (dob.month(), dob.day()) {
    age -= 1;
  }
  u32::try_from(age).ok()
}

/// Extract the leading integer from a free-form weekly-session count.
fn parse_weekly_sessions(raw: &str) -> Option<u32> {
  let digits: String = raw
    .trim()
    .chars()
    .take_while(|c| c.is_ascii_digit())
    .collect();
  digits.parse().ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 6, 15).unwrap() }

  fn base_inputs() -> RewardInputs {
    RewardInputs {
      completed:        true,
      perceived_effort: 5,
      distance_km:      5.0,
      profile:          None,
    }
  }

  // ── Determinism and defaults ────────────────────────────────────────────

  #[test]
  fn score_is_deterministic() {
    let inputs = base_inputs();
    assert_eq!(score(&inputs, today()).unwrap(), score(&inputs, today()).unwrap());
  }

  #[test]
  fn absent_profile_uses_all_defaults() {
    // 50 base + 5*6 effort + 20 distance, no adjustments, ×1.0.
    assert_eq!(score(&base_inputs(), today()).unwrap(), 100);
  }

  #[test]
  fn unparseable_profile_fields_fall_back_to_defaults() {
    let mut inputs = base_inputs();
    inputs.profile = Some(ProfileSnapshot {
      goal:            None,
      date_of_birth:   Some("not-a-date".to_string()),
      weekly_sessions: Some("whenever".to_string()),
    });
    assert_eq!(score(&inputs, today()).unwrap(), 100);
  }

  #[test]
  fn future_date_of_birth_is_treated_as_absent() {
    let mut inputs = base_inputs();
    inputs.profile = Some(ProfileSnapshot {
      date_of_birth: Some("2030-01-01".to_string()),
      ..Default::default()
    });
    assert_eq!(score(&inputs, today()).unwrap(), 100);
  }

  // ── Individual terms ────────────────────────────────────────────────────

  #[test]
  fn effort_is_clamped_before_weighting() {
    let mut inputs = base_inputs();
    inputs.perceived_effort = 99;
    let high = score(&inputs, today()).unwrap();
    inputs.perceived_effort = 10;
    assert_eq!(high, score(&inputs, today()).unwrap());
  }

  #[test]
  fn distance_term_is_capped() {
    let mut inputs = base_inputs();
    inputs.distance_km = 1000.0;
    // 50 + 30 + 60 cap.
    assert_eq!(score(&inputs, today()).unwrap(), 140);
  }

  #[test]
  fn goal_adjustment_applies() {
    let mut inputs = base_inputs();
    inputs.profile = Some(ProfileSnapshot {
      goal: Some(TrainingGoal::WeightLoss),
      ..Default::default()
    });
    assert_eq!(score(&inputs, today()).unwrap(), 120);
  }

  #[test]
  fn age_brackets_apply() {
    let mut inputs = base_inputs();
    inputs.profile = Some(ProfileSnapshot {
      date_of_birth: Some("1960-01-01".to_string()),
      ..Default::default()
    });
    // 64 years old on 2024-06-15: +25.
    assert_eq!(score(&inputs, today()).unwrap(), 125);
  }

  #[test]
  fn frequency_multiplier_applies_last() {
    let mut inputs = base_inputs();
    inputs.profile = Some(ProfileSnapshot {
      weekly_sessions: Some("6 sessions".to_string()),
      ..Default::default()
    });
    // (50 + 30 + 20) × 0.8 = 80.
    assert_eq!(score(&inputs, today()).unwrap(), 80);
  }

  // ── Bounds ──────────────────────────────────────────────────────────────

  #[test]
  fn result_is_clamped_to_max() {
    let inputs = RewardInputs {
      completed:        true,
      perceived_effort: 10,
      distance_km:      1000.0,
      profile:          Some(ProfileSnapshot {
        goal:            Some(TrainingGoal::WeightLoss),
        date_of_birth:   Some("1950-01-01".to_string()),
        weekly_sessions: Some("1".to_string()),
      }),
    };
    // 50 + 60 + 60 + 20 + 25 = 215, ×1.2 = 258 — clamped down.
    assert_eq!(score(&inputs, today()).unwrap(), MAX_POINTS);
  }

  #[test]
  fn result_never_falls_below_min() {
    let inputs = RewardInputs {
      completed:        true,
      perceived_effort: -50,
      distance_km:      -10.0,
      profile:          None,
    };
    let points = score(&inputs, today()).unwrap();
    assert!(points >= MIN_POINTS);
  }

  // ── Precondition ────────────────────────────────────────────────────────

  #[test]
  fn incomplete_session_is_a_domain_error() {
    let mut inputs = base_inputs();
    inputs.completed = false;
    assert!(matches!(
      score(&inputs, today()),
      Err(Error::SessionNotCompleted)
    ));
  }
}
