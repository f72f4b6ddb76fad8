//! SQL schema for the Turnstile SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// The two UNIQUE constraints are the only mutual-exclusion mechanism in the
/// system: correctness across concurrent processes rests on them, not on any
/// in-process lock.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per attempted invocation of a coordinated operation.
-- Response columns stay NULL until the original handler finishes; rows are
-- never deleted except by stale-pending reaping.
CREATE TABLE IF NOT EXISTS idempotency_keys (
    id              TEXT PRIMARY KEY,
    actor_id        TEXT NOT NULL,
    method          TEXT NOT NULL,   -- uppercase HTTP method
    route           TEXT NOT NULL,   -- canonicalized route template
    key             TEXT NOT NULL,   -- client-supplied idempotency key
    request_hash    TEXT NOT NULL,   -- version-prefixed payload fingerprint
    response_status INTEGER,
    response_body   TEXT,
    created_at      TEXT NOT NULL,   -- ISO 8601 UTC
    updated_at      TEXT NOT NULL,
    UNIQUE (actor_id, method, route, key)
);

-- One row per credited real-world event; immutable once created.
CREATE TABLE IF NOT EXISTS reward_ledger (
    reward_id   TEXT NOT NULL PRIMARY KEY,
    actor_id    TEXT NOT NULL,
    source_type TEXT NOT NULL,       -- e.g. 'session_completed'
    source_id   TEXT NOT NULL,
    points      INTEGER NOT NULL,
    inputs_json TEXT NOT NULL,       -- calculation inputs, kept for audit
    created_at  TEXT NOT NULL,
    UNIQUE (actor_id, source_type, source_id)
);

-- Denormalized per-actor running total, re-stamped inside every credit
-- transaction so read paths stay consistent even on replays.
CREATE TABLE IF NOT EXISTS reward_totals (
    actor_id     TEXT PRIMARY KEY,
    total_points INTEGER NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idempotency_pending_idx
    ON idempotency_keys(created_at) WHERE response_status IS NULL;
CREATE INDEX IF NOT EXISTS reward_ledger_actor_idx ON reward_ledger(actor_id);

PRAGMA user_version = 1;
";
