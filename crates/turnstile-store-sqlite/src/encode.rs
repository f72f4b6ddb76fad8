//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Fingerprints and reward inputs are stored
//! verbatim (the fingerprint is already an opaque versioned string; the
//! inputs are compact JSON kept for audit).

use chrono::{DateTime, Utc};
use turnstile_core::{
  fingerprint::Fingerprint,
  key::{IdempotencyKey, RouteTemplate},
  record::{IdempotencyRecord, NaturalKey, StoredResponse},
  reward::SourceType,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SourceType ──────────────────────────────────────────────────────────────

pub fn encode_source_type(s: SourceType) -> &'static str {
  match s {
    SourceType::SessionCompleted => "session_completed",
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `idempotency_keys` row.
pub struct RawRecord {
  pub id:              String,
  pub actor_id:        String,
  pub method:          String,
  pub route:           String,
  pub key:             String,
  pub request_hash:    String,
  pub response_status: Option<u16>,
  pub response_body:   Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawRecord {
  pub fn into_record(self) -> Result<IdempotencyRecord> {
    // Stored key and route were validated on the way in; re-validating on
    // the way out also catches rows written by other tools.
    let key = IdempotencyKey::parse(&self.key).map_err(Error::Core)?;
    let route =
      RouteTemplate::canonicalize("", &self.route).map_err(Error::Core)?;

    let response = match (self.response_status, self.response_body) {
      (Some(status), Some(body)) => Some(StoredResponse { status, body }),
      _ => None,
    };

    Ok(IdempotencyRecord {
      id: decode_uuid(&self.id)?,
      key: NaturalKey {
        actor_id: self.actor_id,
        method: self.method,
        route,
        key,
      },
      request_hash: Fingerprint::from_stored(self.request_hash),
      response,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
