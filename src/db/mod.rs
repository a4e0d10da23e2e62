//! Primary persistent store (§4.B), backed by Postgres through a pooled
//! connection.
//!
//! The pool is sized and timed out exactly per §5: 2-10 connections, a 30s
//! idle timeout, a 10s connect timeout, and a 45s statement timeout enforced
//! per-acquired-connection via `SET statement_timeout`. Migrations run once at
//! startup and a failure there is fatal to process start, matching the
//! "refuse to start degraded" posture the rest of the ambient stack follows.

pub mod channels;
pub mod guild_sync;
pub mod messages;
pub mod models;
pub mod relationships;
pub mod roles;
pub mod starboard;
pub mod users;
pub mod voice;

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{StoreError, StoreResult};

const MAX_CONNECTIONS: u32 = 10;
const MIN_CONNECTIONS: u32 = 2;
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STATEMENT_TIMEOUT_MS: &str = "45000";

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let opts: PgConnectOptions = database_url.parse().map_err(|e: sqlx::Error| {
            StoreError::Constraint(format!("invalid PRIMARY_STORE_URL: {e}"))
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .min_connections(MIN_CONNECTIONS)
            .idle_timeout(IDLE_TIMEOUT)
            .acquire_timeout(CONNECT_TIMEOUT)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query(&format!("SET statement_timeout = {STATEMENT_TIMEOUT_MS}"))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(opts)
            .await?;

        tracing::info!("store connected");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wraps an already-connected pool. Mainly useful to integration tests
    /// that get their pool from `#[sqlx::test]` rather than dialing
    /// [`Store::connect`] themselves.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs `f` inside a single `BEGIN`/`COMMIT`, rolling back automatically
    /// if `f` returns an error (§4.B). Every multi-row mutation in the voice
    /// tracker and ownership engine goes through this.
    pub async fn with_transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        for<'c> F: FnOnce(
            &'c mut Transaction<'_, Postgres>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = StoreResult<T>> + Send + 'c>,
        >,
    {
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                // best-effort; the pool drops and recovers the connection even
                // if the rollback itself fails.
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}
