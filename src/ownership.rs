//! Channel Ownership & Naming Engine (§4.E).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use twilight_model::id::marker::{ChannelMarker, UserMarker};
use twilight_model::id::Id;

use crate::datacache::{ChannelOwner, DataCache};
use crate::db::Store;
use crate::error::{CoreResult, SyncResult};
use crate::locks::KeyedLocks;
use crate::remote::{PermissionOverrides, RemoteGuild};

const RENAME_COOLDOWN: Duration = Duration::from_secs(5);

const DEFAULT_SKIP_PATTERNS: &[&str] = &["available", "new channel", "temp"];

pub struct OwnershipEngine {
    store: Store,
    data_cache: DataCache,
    locks: KeyedLocks<String>,
    last_rename: Mutex<HashMap<String, Instant>>,
    skip_patterns: Vec<String>,
}

impl OwnershipEngine {
    pub fn new(store: Store, data_cache: DataCache) -> Self {
        Self {
            store,
            data_cache,
            locks: KeyedLocks::new(),
            last_rename: Mutex::new(HashMap::new()),
            skip_patterns: DEFAULT_SKIP_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Selects the owner for a channel: greatest cumulative duration among
    /// users currently present, falling back to the longest-standing
    /// historical user if no present user has history, and `None` if the
    /// channel has no session history at all.
    pub async fn elect_owner(&self, channel_id: &str) -> CoreResult<Option<String>> {
        let present = self.store.active_sessions_in_channel(channel_id).await?;
        if present.is_empty() {
            let fallback = self.store.longest_standing_historical_user(channel_id).await?;
            return Ok(fallback);
        }

        let now = Utc::now();
        let mut best: Option<(String, i64)> = None;
        for session in &present {
            let duration = self
                .store
                .cumulative_duration(channel_id, &session.user_id, now)
                .await?;
            if best.as_ref().map(|(_, d)| duration > *d).unwrap_or(true) {
                best = Some((session.user_id.clone(), duration));
            }
        }
        Ok(best.map(|(user_id, _)| user_id))
    }

    /// Re-checks the stored owner against the channel's active set; clears
    /// and re-elects if the owner is no longer present (§8 invariant 10).
    pub async fn ensure_valid_owner(&self, channel_id: &str) -> CoreResult<Option<String>> {
        let _guard = self.locks.lock(channel_id.to_string()).await;

        if let Some(owner) = self.data_cache.get_channel_owner(channel_id).await {
            let active = self.store.active_sessions_in_channel(channel_id).await?;
            if active.iter().any(|s| s.user_id == owner.owner_user_id) {
                return Ok(Some(owner.owner_user_id));
            }
            self.data_cache.clear_channel_owner(channel_id).await;
        }

        let Some(elected) = self.elect_owner(channel_id).await? else {
            return Ok(None);
        };
        self.data_cache
            .set_channel_owner(
                channel_id,
                &ChannelOwner {
                    owner_user_id: elected.clone(),
                    owned_since: Utc::now(),
                    previous_owner_id: None,
                },
            )
            .await;
        Ok(Some(elected))
    }

    /// Transfers ownership away from `former_owner_id` when the channel is
    /// not empty, updating remote permission overrides to match.
    pub async fn transfer_on_leave(
        &self,
        channel_id: &str,
        former_owner_id: &str,
        remote: &dyn RemoteGuild,
    ) -> CoreResult<Option<String>> {
        let _guard = self.locks.lock(channel_id.to_string()).await;

        let active = self.store.active_sessions_in_channel(channel_id).await?;
        if active.is_empty() {
            self.data_cache.clear_channel_owner(channel_id).await;
            return Ok(None);
        }

        let Some(new_owner) = self.elect_owner(channel_id).await? else {
            return Ok(None);
        };
        if new_owner == former_owner_id {
            return Ok(Some(new_owner));
        }

        let channel: Id<ChannelMarker> = channel_id
            .parse()
            .map_err(|_| crate::error::CoreError::Config("invalid channel id".into()))?;
        let former: Id<UserMarker> = former_owner_id
            .parse()
            .map_err(|_| crate::error::CoreError::Config("invalid user id".into()))?;
        let new: Id<UserMarker> = new_owner
            .parse()
            .map_err(|_| crate::error::CoreError::Config("invalid user id".into()))?;

        apply_transfer_overrides(remote, channel, former, new).await?;

        self.data_cache
            .set_channel_owner(
                channel_id,
                &ChannelOwner {
                    owner_user_id: new_owner.clone(),
                    owned_since: Utc::now(),
                    previous_owner_id: Some(former_owner_id.to_string()),
                },
            )
            .await;
        tracing::info!(channel_id, previous_owner = former_owner_id, new_owner = %new_owner, "ownership transferred");
        Ok(Some(new_owner))
    }

    /// Resolves and, if due, applies the channel's name: the owner's stored
    /// preference, else `"{display}'s Channel"`. Skips if the cooldown
    /// hasn't elapsed or the current name matches a skip-pattern.
    pub async fn apply_rename_policy(
        &self,
        channel_id: &str,
        current_name: &str,
        owner_preferred_name: Option<&str>,
        owner_display_name: &str,
        remote: &dyn RemoteGuild,
    ) -> CoreResult<()> {
        if self.matches_skip_pattern(current_name) {
            return Ok(());
        }
        if !self.cooldown_elapsed(channel_id) {
            return Ok(());
        }

        let target_name = match owner_preferred_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{owner_display_name}'s Channel"),
        };
        if target_name == current_name {
            return Ok(());
        }

        let channel: Id<ChannelMarker> = channel_id
            .parse()
            .map_err(|_| crate::error::CoreError::Config("invalid channel id".into()))?;

        // Start the cooldown on the attempt itself, not just a successful
        // one: §4.E requires no retry within the cooldown window even after
        // a failed rename call.
        self.last_rename.lock().insert(channel_id.to_string(), Instant::now());

        match remote.rename_channel(channel, &target_name).await {
            Ok(()) => {
                self.store.rename_channel(channel_id, &target_name).await?;
            }
            Err(e) => {
                tracing::warn!(channel_id, error = %e, "channel rename failed, leaving name unchanged");
            }
        }
        Ok(())
    }

    fn matches_skip_pattern(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.skip_patterns.iter().any(|p| lower.contains(p.as_str()))
    }

    fn cooldown_elapsed(&self, channel_id: &str) -> bool {
        let mut map = self.last_rename.lock();
        match map.get(channel_id) {
            Some(last) if last.elapsed() < RENAME_COOLDOWN => false,
            _ => {
                map.retain(|_, t| t.elapsed() < Duration::from_secs(300));
                true
            }
        }
    }
}

async fn apply_transfer_overrides(
    remote: &dyn RemoteGuild,
    channel: Id<ChannelMarker>,
    former_owner: Id<UserMarker>,
    new_owner: Id<UserMarker>,
) -> SyncResult<()> {
    remote.clear_overrides(channel, former_owner).await?;
    remote
        .set_owner_overrides(channel, new_owner, &PermissionOverrides::OWNER)
        .await?;
    Ok(())
}
