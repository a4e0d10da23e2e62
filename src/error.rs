//! Typed error boundaries for each subsystem.
//!
//! Cache errors are absorbed by the two-tier facade and never reach callers.
//! Store errors propagate out of transactional scopes. Remote errors during
//! reconciliation are accumulated rather than aborting the whole sync.

use thiserror::Error;

/// Errors from the persistent store (§4.B, §7 "Persistence constraint violation").
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("constraint violation: {0}")]
    Constraint(String),
}

/// Errors from the hot cache (§4.A, §7 "Data corruption in cache").
///
/// `Cache::get`/`set`/`del` never return these to callers of [`crate::datacache::DataCache`] —
/// they're absorbed and logged at the two-tier boundary. They're kept typed so the
/// cache implementation itself, and its tests, can distinguish connect failures from
/// protocol failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection failed after retry budget exhausted: {0}")]
    Connect(String),
    #[error("cache protocol error: {0}")]
    Protocol(#[from] redis::RedisError),
}

/// Errors surfaced from a single guild sync pass (§4.F). Individual per-channel
/// failures are accumulated into `SyncResult::errors` rather than raised here;
/// this variant is for failures that abort the whole pass (e.g. can't even list
/// channels).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote call failed: {0}")]
    Remote(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level error for anything that can escape an event handler or background
/// task boundary. Individual subsystems keep their own typed errors; this is the
/// "any error" wrapper used at `main`, in `tokio::spawn`ed loops, and in dispatch.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("remote call failed: {0}")]
    Remote(String),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type SyncResult<T> = Result<T, SyncError>;
pub type CoreResult<T> = Result<T, CoreError>;
