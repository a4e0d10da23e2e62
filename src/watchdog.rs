//! Health Watchdog (§4.G): a single background task with two monotonic
//! cadences — a 5-minute health check and a 30-minute maintenance pass.
//!
//! Deliberately built on `tokio::time::interval` (monotonic ticks from task
//! start) rather than wall-clock minute-of-hour alignment, per the redesign
//! flag in §9.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;

use crate::db::Store;
use crate::remote::RemoteGuild;
use crate::sync::SyncEngine;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30 * 60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
const HEALTHY_THRESHOLD: f64 = 0.95;

pub struct HealthWatchdog {
    store: Store,
    sync_engine: SyncEngine,
    primary_guild_id: Id<GuildMarker>,
}

impl HealthWatchdog {
    pub fn new(store: Store, sync_engine: SyncEngine, primary_guild_id: Id<GuildMarker>) -> Self {
        Self { store, sync_engine, primary_guild_id }
    }

    /// Runs until `shutdown` fires, then drains within the 1-second grace
    /// period before returning.
    pub async fn run(&self, remote: &dyn RemoteGuild, mut shutdown: watch::Receiver<bool>) {
        let mut health_tick = interval(HEALTH_CHECK_INTERVAL);
        health_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut maintenance_tick = interval(MAINTENANCE_INTERVAL);
        maintenance_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = health_tick.tick() => {
                    if let Err(e) = self.health_check(remote).await {
                        tracing::warn!(error = %e, "health check failed");
                    }
                }
                _ = maintenance_tick.tick() => {
                    if let Err(e) = self.maintenance(remote).await {
                        tracing::warn!(error = %e, "maintenance pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {}).await;
        tracing::info!("health watchdog stopped");
    }

    async fn health_check(&self, remote: &dyn RemoteGuild) -> crate::error::SyncResult<()> {
        let guild_id_str = self.primary_guild_id.to_string();
        let local_users = self.store.count_users(&guild_id_str).await? as f64;
        let local_roles = self.store.count_roles(&guild_id_str).await? as f64;
        let remote_members = remote.member_count(self.primary_guild_id).await?.max(1) as f64;
        let remote_roles = remote.role_count(self.primary_guild_id).await?.max(1) as f64;

        let user_sync_percent = local_users / remote_members;
        let role_sync_percent = local_roles / remote_roles;

        let sync_record = self.store.get_guild_sync(&guild_id_str).await?;
        let stale = match &sync_record {
            Some(record) => {
                record.total_users as f64 != local_users || record.total_roles as f64 != local_roles
            }
            None => true,
        };

        let unhealthy = user_sync_percent < HEALTHY_THRESHOLD || role_sync_percent < HEALTHY_THRESHOLD || stale;
        tracing::info!(
            guild_id = %guild_id_str,
            user_sync_percent,
            role_sync_percent,
            unhealthy,
            "health check"
        );

        if unhealthy {
            let outcome = self
                .sync_engine
                .sync_guild(self.primary_guild_id, true, 1000, remote)
                .await?;
            tracing::info!(
                synced_users = outcome.synced_users,
                synced_roles = outcome.synced_roles,
                synced_messages = outcome.synced_messages,
                error_count = outcome.errors.len(),
                "forced full sync after unhealthy check"
            );
        }
        Ok(())
    }

    /// Closes active sessions whose channel no longer exists or whose user
    /// is no longer in that channel's active roster (§4.G.5) — not a
    /// wall-clock age cutoff, which would both miss a session whose channel
    /// vanished minutes ago and wrongly kill a still-valid long-running one.
    async fn maintenance(&self, _remote: &dyn RemoteGuild) -> crate::error::SyncResult<()> {
        let guild_id_str = self.primary_guild_id.to_string();
        let closed = self.store.close_stale_sessions(&guild_id_str, Utc::now()).await?;
        if closed > 0 {
            tracing::info!(closed, "closed stale voice sessions during maintenance");
        }
        Ok(())
    }
}
