//! [`SqliteStore`] — the SQLite implementation of [`CoordinationStore`] and
//! [`RewardLedger`].

use std::{path::Path, sync::Arc};

use chrono::Duration;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use turnstile_core::{
  env::{Clock, IdSource, RandomIds, SystemClock},
  fingerprint::Fingerprint,
  record::NaturalKey,
  reward::{self, CreditOutcome, RewardClaim},
  store::{Begun, CoordinationStore, RewardLedger},
};

use crate::{
  Error, Result,
  encode::{RawRecord, decode_uuid, encode_dt, encode_source_type, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Turnstile store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. Time and id
/// generation are injected so tests can freeze both.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  clock: Arc<dyn Clock>,
  ids:   Arc<dyn IdSource>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, Arc::new(SystemClock), Arc::new(RandomIds)).await
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, Arc::new(SystemClock), Arc::new(RandomIds)).await
  }

  /// Open an in-memory store with an injected clock and id source.
  pub async fn open_in_memory_with(
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, clock, ids).await
  }

  async fn init(
    conn: tokio_rusqlite::Connection,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
  ) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, clock, ids })
  }
}

// ─── CoordinationStore impl ──────────────────────────────────────────────────

/// Closure-side result of the insert-or-fetch round trip; decoded into
/// [`Begun`] on the async side.
enum BegunRaw {
  Inserted,
  Existing(RawRecord),
  Vanished,
}

impl CoordinationStore for SqliteStore {
  type Error = Error;

  async fn begin(&self, key: NaturalKey, fingerprint: Fingerprint) -> Result<Begun> {
    let id      = self.ids.next_id();
    let id_str  = encode_uuid(id);
    let now_str = encode_dt(self.clock.now());

    let actor_id = key.actor_id;
    let method   = key.method;
    let route    = key.route.as_str().to_string();
    let client_key = key.key.as_str().to_string();
    let hash     = fingerprint.as_str().to_string();

    // Insert-or-fetch in one round trip: the uniqueness constraint, not a
    // prior read, arbitrates between concurrent duplicates.
    let raw = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT INTO idempotency_keys (
             id, actor_id, method, route, key, request_hash,
             response_status, response_body, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, ?7)
           ON CONFLICT (actor_id, method, route, key) DO NOTHING",
          rusqlite::params![id_str, actor_id, method, route, client_key, hash, now_str],
        )?;

        if inserted == 1 {
          return Ok(BegunRaw::Inserted);
        }

        let existing = conn
          .query_row(
            "SELECT id, actor_id, method, route, key, request_hash,
                    response_status, response_body, created_at, updated_at
             FROM idempotency_keys
             WHERE actor_id = ?1 AND method = ?2 AND route = ?3 AND key = ?4",
            rusqlite::params![actor_id, method, route, client_key],
            |row| {
              Ok(RawRecord {
                id:              row.get(0)?,
                actor_id:        row.get(1)?,
                method:          row.get(2)?,
                route:           row.get(3)?,
                key:             row.get(4)?,
                request_hash:    row.get(5)?,
                response_status: row.get(6)?,
                response_body:   row.get(7)?,
                created_at:      row.get(8)?,
                updated_at:      row.get(9)?,
              })
            },
          )
          .optional()?;

        Ok(match existing {
          Some(raw) => BegunRaw::Existing(raw),
          None      => BegunRaw::Vanished,
        })
      })
      .await?;

    Ok(match raw {
      BegunRaw::Inserted      => Begun::Inserted(id),
      BegunRaw::Existing(raw) => Begun::Existing(raw.into_record()?),
      BegunRaw::Vanished      => Begun::Vanished,
    })
  }

  async fn complete(&self, record_id: Uuid, status: u16, body: String) -> Result<()> {
    let id_str  = encode_uuid(record_id);
    let now_str = encode_dt(self.clock.now());

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE idempotency_keys
           SET response_status = ?1, response_body = ?2, updated_at = ?3
           WHERE id = ?4",
          rusqlite::params![status, body, now_str, id_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::RecordNotFound(record_id));
    }
    Ok(())
  }

  async fn reap_stale_pending(&self, max_age: Duration) -> Result<usize> {
    let cutoff_str = encode_dt(self.clock.now() - max_age);

    let reaped = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM idempotency_keys
           WHERE response_status IS NULL AND created_at < ?1",
          rusqlite::params![cutoff_str],
        )?)
      })
      .await?;

    Ok(reaped)
  }
}

// ─── RewardLedger impl ───────────────────────────────────────────────────────

/// Closure-side result of the credit transaction.
enum CreditStep {
  Credited { reward_id: String },
  Replayed { reward_id: String, points: i64 },
  /// Scoring rejected the claim on the fresh path; nothing was committed.
  Rejected,
}

impl RewardLedger for SqliteStore {
  type Error = Error;

  async fn credit_once(&self, claim: RewardClaim) -> Result<CreditOutcome> {
    let today   = self.clock.now().date_naive();
    let now_str = encode_dt(self.clock.now());

    // The calculation is pure and its inputs are already gathered, so score
    // up front; whether the result is used at all is decided inside the
    // transaction, after the existence check.
    let scored       = reward::score(&claim.inputs, today);
    let fresh_points = scored.as_ref().ok().copied();

    let new_id      = self.ids.next_id();
    let new_id_str  = encode_uuid(new_id);
    let inputs_json = serde_json::to_string(&claim.inputs)?;

    let actor_id    = claim.actor_id;
    let source_type = encode_source_type(claim.source_type).to_string();
    let source_id   = claim.source_id;

    let step = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing: Option<(String, i64)> = tx
          .query_row(
            "SELECT reward_id, points FROM reward_ledger
             WHERE actor_id = ?1 AND source_type = ?2 AND source_id = ?3",
            rusqlite::params![actor_id, source_type, source_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;

        if let Some((reward_id, points)) = existing {
          // Replayed credit: never recompute, never touch the ledger row,
          // but still re-stamp the denormalized total.
          restamp_total(&tx, &actor_id, &now_str)?;
          tx.commit()?;
          return Ok(CreditStep::Replayed { reward_id, points });
        }

        let Some(points) = fresh_points else {
          // Dropping the transaction rolls everything back.
          return Ok(CreditStep::Rejected);
        };

        // OR IGNORE closes the cross-process race: a concurrent credit that
        // slipped in between our lookup and this insert simply degrades us
        // to the replay path below.
        let inserted = tx.execute(
          "INSERT OR IGNORE INTO reward_ledger (
             reward_id, actor_id, source_type, source_id,
             points, inputs_json, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            new_id_str, actor_id, source_type, source_id,
            points, inputs_json, now_str,
          ],
        )?;

        if inserted == 0 {
          let (reward_id, points): (String, i64) = tx.query_row(
            "SELECT reward_id, points FROM reward_ledger
             WHERE actor_id = ?1 AND source_type = ?2 AND source_id = ?3",
            rusqlite::params![actor_id, source_type, source_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )?;
          restamp_total(&tx, &actor_id, &now_str)?;
          tx.commit()?;
          return Ok(CreditStep::Replayed { reward_id, points });
        }

        restamp_total(&tx, &actor_id, &now_str)?;
        tx.commit()?;
        Ok(CreditStep::Credited { reward_id: new_id_str })
      })
      .await?;

    match step {
      CreditStep::Credited { reward_id } => Ok(CreditOutcome {
        reward_id: decode_uuid(&reward_id)?,
        points:    scored?,
        awarded:   true,
      }),
      CreditStep::Replayed { reward_id, points } => Ok(CreditOutcome {
        reward_id: decode_uuid(&reward_id)?,
        points,
        awarded: false,
      }),
      CreditStep::Rejected => Err(Error::Core(
        scored
          .err()
          .unwrap_or(turnstile_core::Error::SessionNotCompleted),
      )),
    }
  }

  async fn total_points<'a>(&'a self, actor_id: &'a str) -> Result<i64> {
    let actor_id = actor_id.to_string();

    let total: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT total_points FROM reward_totals WHERE actor_id = ?1",
              rusqlite::params![actor_id],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(total.unwrap_or(0))
  }
}

/// Recompute an actor's denormalized total from the ledger and upsert it.
/// Called inside the credit transaction on every path that commits.
fn restamp_total(
  tx: &rusqlite::Transaction<'_>,
  actor_id: &str,
  now_str: &str,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO reward_totals (actor_id, total_points, updated_at)
     VALUES (
       ?1,
       (SELECT COALESCE(SUM(points), 0) FROM reward_ledger WHERE actor_id = ?1),
       ?2
     )
     ON CONFLICT (actor_id) DO UPDATE SET
       total_points = excluded.total_points,
       updated_at   = excluded.updated_at",
    rusqlite::params![actor_id, now_str],
  )?;
  Ok(())
}
