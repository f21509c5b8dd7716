//! Persistence layer for cached RPC results.
//!
//! The store owns a single table, `rpc_cache`, and exposes exactly the
//! operations the pipeline and the cleanup worker need: read-with-touch,
//! upsert, aggregate size, row count, and a size-targeted prune. It is the
//! only shared mutable resource in the system; concurrency is delegated to
//! the backing database through a connection pool.
//!
//! The [`CacheStore`] trait is the seam between the pipeline and the backing
//! database: production uses [`PgCacheStore`], tests substitute an in-memory
//! double with the same prune semantics.
//!
//! # Size accounting
//!
//! The cache size is `Σ (result_length + 64)` over all rows, where the fixed
//! [`ROW_OVERHEAD_BYTES`] constant approximates key, timestamps, and row
//! header. It is an estimate, not a measurement: the configured cap is a soft
//! bound.

pub mod postgres;

pub use postgres::PgCacheStore;

use async_trait::async_trait;
use thiserror::Error;

/// Fixed per-row overhead added to `result_length` in all size accounting.
pub const ROW_OVERHEAD_BYTES: i64 = 64;

/// Error type for store operations.
///
/// A missing row is *not* an error: reads report it as `Ok(None)` so that
/// callers can distinguish "cache miss" from "store unavailable".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Failure reported by a non-SQL backend (used by test doubles).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The cache store operations used by the proxy pipeline and cleanup worker.
///
/// All implementations must be safe for concurrent callers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the stored `response` for `key`, atomically refreshing the
    /// row's `last_accessed_at`, or `None` if no such row exists.
    ///
    /// The touch happens in the same statement as the read so that a
    /// concurrent prune cannot observe the row between the two.
    async fn get_and_touch(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Inserts or replaces the entry for `key`. On replace, `response`,
    /// `result_length`, and `last_accessed_at` are updated; `created_at` is
    /// preserved.
    async fn put(&self, key: &str, method: &str, response: &[u8]) -> Result<(), StoreError>;

    /// Returns `Σ (result_length + 64)` over all rows, 0 when empty.
    async fn size(&self) -> Result<i64, StoreError>;

    /// Returns the number of cached rows.
    async fn item_count(&self) -> Result<i64, StoreError>;

    /// Deletes the least-recently-accessed entries until roughly
    /// `bytes_to_free` bytes are released, and returns the freed total
    /// (including per-row overhead).
    ///
    /// Rows are scanned in `(last_accessed_at ASC, result_length DESC)`
    /// order and deleted while the running total *excluding* the current row
    /// stays below `bytes_to_free`. The prune may therefore under-free by up
    /// to one row when `bytes_to_free` falls inside it; callers must tolerate
    /// the approximation.
    async fn prune(&self, bytes_to_free: i64) -> Result<i64, StoreError>;
}
