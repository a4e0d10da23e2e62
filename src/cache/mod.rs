//! Hot cache tier (§4.A).
//!
//! Backed by Redis through a pooled, multiplexed client. Connection policy is
//! lazy connect with exponential backoff (base 1s, capped at 3s between
//! attempts); the initial connect budget is 5 attempts verified by a 5-second
//! ping deadline, matching the spec exactly. Steady-state operation reuses the
//! same backoff shape but with a 10-attempt budget before a call surfaces a
//! [`CacheError::Connect`] to its caller — who, per the two-tier contract in
//! [`crate::datacache`], always treats that as a miss rather than a failure.

pub mod codec;
pub mod keys;

use std::time::Duration;

use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tokio::time::timeout;

use crate::error::{CacheError, CacheResult};

const CONNECT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const CONNECT_BACKOFF_CAP: Duration = Duration::from_secs(3);
const CONNECT_MAX_ATTEMPTS: u32 = 5;
const OP_RETRY_MAX_ATTEMPTS: u32 = 10;
const PING_DEADLINE: Duration = Duration::from_secs(5);

/// Adds up to 20% jitter to a backoff so many connections recovering from
/// the same outage don't all retry in lockstep.
fn jittered(backoff: Duration) -> Duration {
    use rand::Rng;
    let jitter_ms = rand::thread_rng().gen_range(0..=(backoff.as_millis() as u64 / 5).max(1));
    backoff + Duration::from_millis(jitter_ms)
}

#[derive(Clone)]
pub struct Cache {
    pool: bb8::Pool<RedisConnectionManager>,
}

impl Cache {
    /// Lazily connects with exponential backoff, verifying liveness with a
    /// ping under a 5-second deadline before returning.
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let manager = RedisConnectionManager::new(url)
            .map_err(|e| CacheError::Connect(e.to_string()))?;
        let pool = bb8::Pool::builder()
            .build(manager)
            .await
            .map_err(|e| CacheError::Connect(e.to_string()))?;

        let mut backoff = CONNECT_BACKOFF_BASE;
        let mut last_err = None;
        for attempt in 1..=CONNECT_MAX_ATTEMPTS {
            let ping = async {
                let mut conn = pool.get().await.map_err(|e| CacheError::Connect(e.to_string()))?;
                redis::cmd("PING")
                    .query_async::<_, String>(&mut *conn)
                    .await
                    .map_err(CacheError::from)
            };
            match timeout(PING_DEADLINE, ping).await {
                Ok(Ok(_)) => {
                    tracing::info!(attempt, "cache connected");
                    return Ok(Self { pool });
                }
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "cache ping failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    tracing::warn!(attempt, "cache ping timed out after {PING_DEADLINE:?}");
                    last_err = Some(CacheError::Connect("ping deadline exceeded".into()));
                }
            }
            if attempt < CONNECT_MAX_ATTEMPTS {
                tokio::time::sleep(jittered(backoff)).await;
                backoff = (backoff * 2).min(CONNECT_BACKOFF_CAP);
            }
        }
        Err(last_err.unwrap_or_else(|| CacheError::Connect("exhausted connect attempts".into())))
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> CacheResult<T>
    where
        F: FnMut(bb8::PooledConnection<'_, RedisConnectionManager>) -> Fut,
        Fut: std::future::Future<Output = CacheResult<T>>,
    {
        let mut backoff = CONNECT_BACKOFF_BASE;
        let mut last_err = None;
        for attempt in 1..=OP_RETRY_MAX_ATTEMPTS {
            match self.pool.get().await {
                Ok(conn) => match op(conn).await {
                    Ok(v) => return Ok(v),
                    Err(e) => last_err = Some(e),
                },
                Err(e) => last_err = Some(CacheError::Connect(e.to_string())),
            }
            if attempt < OP_RETRY_MAX_ATTEMPTS {
                tokio::time::sleep(jittered(backoff)).await;
                backoff = (backoff * 2).min(CONNECT_BACKOFF_CAP);
            }
        }
        Err(last_err.unwrap_or_else(|| CacheError::Connect("exhausted retry attempts".into())))
    }

    /// Reads a key, quarantining (deleting) it and reporting a miss if the
    /// stored payload is corrupt (§8 invariant 5).
    pub async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let raw: Option<String> = self
            .with_retry(|mut conn| async move { Ok(conn.get(key).await?) })
            .await?;
        let Some(raw) = raw else { return Ok(None) };
        self.decode_or_quarantine(key, &raw).await
    }

    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) -> CacheResult<()> {
        let encoded = codec::encode(value);
        let secs = ttl.as_secs().max(1);
        self.with_retry(|mut conn| {
            let encoded = encoded.clone();
            async move {
                conn.set_ex::<_, _, ()>(key, encoded, secs).await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn del(&self, key: &str) -> CacheResult<()> {
        self.with_retry(|mut conn| async move {
            conn.del::<_, ()>(key).await?;
            Ok(())
        })
        .await
    }

    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.with_retry(|mut conn| async move { Ok(conn.exists(key).await?) })
            .await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let secs = ttl.as_secs().max(1) as i64;
        self.with_retry(|mut conn| async move {
            conn.expire::<_, ()>(key, secs).await?;
            Ok(())
        })
        .await
    }

    pub async fn sadd(&self, key: &str, member: &Value) -> CacheResult<()> {
        let encoded = codec::encode(member);
        self.with_retry(|mut conn| {
            let encoded = encoded.clone();
            async move {
                conn.sadd::<_, _, ()>(key, encoded).await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn srem(&self, key: &str, member: &Value) -> CacheResult<()> {
        let encoded = codec::encode(member);
        self.with_retry(|mut conn| {
            let encoded = encoded.clone();
            async move {
                conn.srem::<_, _, ()>(key, encoded).await?;
                Ok(())
            }
        })
        .await
    }

    /// Returns the set's members, dropping (and quarantining) any individual
    /// member whose payload is corrupt rather than failing the whole read.
    pub async fn smembers(&self, key: &str) -> CacheResult<Vec<Value>> {
        let raw: Vec<String> = self
            .with_retry(|mut conn| async move { Ok(conn.smembers(key).await?) })
            .await?;
        let mut out = Vec::with_capacity(raw.len());
        for member in raw {
            match codec::decode(&member) {
                codec::DecodeOutcome::Ok(decoded) => out.push(decoded.into_json()),
                codec::DecodeOutcome::Corrupt => {
                    tracing::warn!(key, "quarantining corrupt set member");
                    let _ = self.srem_raw(key, &member).await;
                }
            }
        }
        Ok(out)
    }

    /// Removes a set member by its exact stored bytes, bypassing
    /// [`codec::encode`] — used to quarantine a corrupt member, whose raw
    /// form would otherwise be re-quoted by the codec and never match the
    /// value actually stored in the set.
    async fn srem_raw(&self, key: &str, raw_member: &str) -> CacheResult<()> {
        self.with_retry(|mut conn| async move {
            conn.srem::<_, _, ()>(key, raw_member).await?;
            Ok(())
        })
        .await
    }

    async fn decode_or_quarantine(&self, key: &str, raw: &str) -> CacheResult<Option<Value>> {
        match codec::decode(raw) {
            codec::DecodeOutcome::Ok(decoded) => Ok(Some(decoded.into_json())),
            codec::DecodeOutcome::Corrupt => {
                tracing::warn!(key, "quarantining corrupt cache value");
                self.del(key).await?;
                Ok(None)
            }
        }
    }
}
