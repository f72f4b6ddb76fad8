//! SQLite backend for the Turnstile coordination store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. Both uniqueness-guarded write
//! paths — opening an idempotency record and crediting a reward — execute as
//! single atomic round trips against the connection.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
