//! SQLite backend for Segmentify.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write goes through one
//! connection, and membership batches run inside a single `IMMEDIATE`
//! transaction, so the ledger's preconditions are re-checked under the write
//! lock they are committed with.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
