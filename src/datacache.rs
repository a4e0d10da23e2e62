//! Two-tier cache-through facade over the cache tier and the persistent
//! store (§4.C).
//!
//! Contract for every entity class: `get` consults the cache first, falls
//! back to the store on a miss and best-effort repopulates the cache; `set`
//! writes the cache then the store, where a cache failure is swallowed but a
//! store failure propagates; `delete` removes from both tiers. Cache errors
//! (as opposed to cache misses) are logged and treated as a miss throughout —
//! they never escape this facade (§5, §7).
//!
//! Channel ownership and guild config have no row in the persistent schema
//! (§3: "the Tracker and Ownership components never hold state outside C") —
//! their store fallback is always a miss, so losing the cache value means
//! losing the record, which is fine because ownership is always
//! re-derivable by election and guild config is a denormalized convenience
//! copy of startup configuration.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::{keys, Cache};
use crate::db::models::StarboardEntryRow;
use crate::db::Store;
use crate::error::CoreResult;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(keys::DEFAULT_TTL);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOwner {
    pub owner_user_id: String,
    pub owned_since: chrono::DateTime<Utc>,
    pub previous_owner_id: Option<String>,
}

#[derive(Clone)]
pub struct DataCache {
    cache: Cache,
    store: Store,
}

impl DataCache {
    pub fn new(cache: Cache, store: Store) -> Self {
        Self { cache, store }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    async fn cache_get(&self, key: &str) -> Option<Value> {
        match self.cache.get(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache get failed, treating as miss");
                None
            }
        }
    }

    async fn cache_set(&self, key: &str, value: &Value, ttl: Duration) {
        if let Err(e) = self.cache.set(key, value, ttl).await {
            tracing::warn!(key, error = %e, "cache set failed (non-fatal)");
        }
    }

    async fn cache_del(&self, key: &str) {
        if let Err(e) = self.cache.del(key).await {
            tracing::warn!(key, error = %e, "cache delete failed (non-fatal)");
        }
    }

    // -- channel ownership (cache-only; §3) ---------------------------------

    pub async fn get_channel_owner(&self, channel_id: &str) -> Option<ChannelOwner> {
        let value = self.cache_get(&keys::channel_owner(channel_id)).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn set_channel_owner(&self, channel_id: &str, owner: &ChannelOwner) {
        let key = keys::channel_owner(channel_id);
        let value = serde_json::to_value(owner).expect("ChannelOwner always serializes");
        self.cache_set(&key, &value, DEFAULT_CACHE_TTL).await;
    }

    pub async fn clear_channel_owner(&self, channel_id: &str) {
        self.cache_del(&keys::channel_owner(channel_id)).await;
    }

    // -- guild config (cache-only convenience copy) -------------------------

    pub async fn get_guild_config(&self, guild_id: &str) -> Option<Value> {
        self.cache_get(&keys::guild_config(guild_id)).await
    }

    pub async fn set_guild_config(&self, guild_id: &str, config: &Value) {
        self.cache_set(&keys::guild_config(guild_id), config, DEFAULT_CACHE_TTL).await;
    }

    // -- user preferences (cache + `users.mod_preferences`) ------------------

    pub async fn get_user_prefs(&self, user_id: &str, guild_id: &str) -> CoreResult<Option<Value>> {
        let key = keys::user_prefs(user_id, guild_id);
        if let Some(value) = self.cache_get(&key).await {
            return Ok(Some(value));
        }
        let Some(prefs) = self.store.get_mod_preferences(guild_id, user_id).await? else {
            return Ok(None);
        };
        self.cache_set(&key, &prefs, DEFAULT_CACHE_TTL).await;
        Ok(Some(prefs))
    }

    pub async fn set_user_prefs(&self, user_id: &str, guild_id: &str, prefs: &Value) -> CoreResult<()> {
        let key = keys::user_prefs(user_id, guild_id);
        self.cache_set(&key, prefs, DEFAULT_CACHE_TTL).await;
        self.store.set_mod_preferences(guild_id, user_id, prefs).await?;
        Ok(())
    }

    pub async fn delete_user_prefs(&self, user_id: &str, guild_id: &str) -> CoreResult<()> {
        self.cache_del(&keys::user_prefs(user_id, guild_id)).await;
        self.store.set_mod_preferences(guild_id, user_id, &json!({})).await?;
        Ok(())
    }

    // -- role data (cache + `users.roles`); also stands in for the "roll
    // data" entity class named in §4.C, which names no cache key or schema
    // column anywhere else in the spec and is treated as referring to the
    // same per-user role set. -------------------------------------------

    pub async fn get_role_data(&self, user_id: &str, guild_id: &str) -> CoreResult<Option<Vec<String>>> {
        let key = keys::user_role_data(user_id, guild_id);
        if let Some(value) = self.cache_get(&key).await {
            if let Ok(roles) = serde_json::from_value::<Vec<String>>(value) {
                return Ok(Some(roles));
            }
        }
        let Some(roles) = self.store.get_role_ids(guild_id, user_id).await? else {
            return Ok(None);
        };
        let encoded = serde_json::to_value(&roles).expect("Vec<String> always serializes");
        self.cache_set(&key, &encoded, DEFAULT_CACHE_TTL).await;
        Ok(Some(roles))
    }

    pub async fn invalidate_role_data(&self, user_id: &str, guild_id: &str) {
        self.cache_del(&keys::user_role_data(user_id, guild_id)).await;
    }

    // -- starboard entries (cache + `starboard_entries`) --------------------

    pub async fn get_starboard_entry(
        &self,
        guild_id: &str,
        message_id: &str,
    ) -> CoreResult<Option<StarboardEntryRow>> {
        let key = keys::starboard_entry(guild_id, message_id);
        if let Some(value) = self.cache_get(&key).await {
            if let Ok(entry) = serde_json::from_value(value) {
                return Ok(Some(entry));
            }
        }
        let Some(entry) = self.store.get_starboard_entry(guild_id, message_id).await? else {
            return Ok(None);
        };
        let encoded = serde_json::to_value(&entry).expect("StarboardEntryRow always serializes");
        self.cache_set(&key, &encoded, DEFAULT_CACHE_TTL).await;
        Ok(Some(entry))
    }

    pub async fn put_starboard_entry(&self, entry: &StarboardEntryRow) {
        let key = keys::starboard_entry(&entry.guild_id, &entry.original_message_id);
        let encoded = serde_json::to_value(entry).expect("StarboardEntryRow always serializes");
        self.cache_set(&key, &encoded, DEFAULT_CACHE_TTL).await;
    }

    pub async fn delete_starboard_entry(&self, guild_id: &str, message_id: &str) -> CoreResult<()> {
        self.cache_del(&keys::starboard_entry(guild_id, message_id)).await;
        self.store.delete_starboard_entry(guild_id, message_id).await?;
        Ok(())
    }
}
