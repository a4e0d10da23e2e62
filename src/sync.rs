//! Guild Sync Engine (§4.F): incremental/full reconciliation of remote state
//! into the persistent store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use twilight_model::id::marker::{GuildMarker, MessageMarker};
use twilight_model::id::Id;
use twilight_model::util::Timestamp;

use crate::db::Store;
use crate::error::SyncResult;
use crate::remote::RemoteGuild;

fn timestamp_to_chrono(ts: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.as_secs(), 0).unwrap_or_else(Utc::now)
}

const PAGE_DELAY: Duration = Duration::from_millis(100);
const PAGE_SIZE: usize = 100;
const INCREMENTAL_MESSAGE_LIMIT: usize = 100;

#[derive(Debug, Default, Clone)]
pub struct SyncOutcome {
    pub synced_users: u64,
    pub synced_roles: u64,
    pub synced_messages: u64,
    pub errors: Vec<String>,
}

pub struct SyncEngine {
    store: Store,
}

impl SyncEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn sync_guild(
        &self,
        guild_id: Id<GuildMarker>,
        force_full_sync: bool,
        message_limit: usize,
        remote: &dyn RemoteGuild,
    ) -> SyncResult<SyncOutcome> {
        let guild_id_str = guild_id.to_string();
        let prior = self.store.get_guild_sync(&guild_id_str).await?;
        let full_pass = force_full_sync || !prior.as_ref().map(|p| p.is_fully_synced).unwrap_or(false);

        let mut outcome = SyncOutcome::default();

        outcome.synced_roles = self.sync_roles(guild_id, remote, &mut outcome.errors).await;
        outcome.synced_users = self.sync_users(guild_id, remote, &mut outcome.errors).await;

        let per_channel_limit = if full_pass { message_limit } else { INCREMENTAL_MESSAGE_LIMIT };
        let last_message_id = prior.as_ref().and_then(|p| p.last_message_id.clone());
        let (synced_messages, newest_message_id) = self
            .sync_messages(
                guild_id,
                remote,
                per_channel_limit,
                if full_pass { None } else { last_message_id.as_deref() },
                &mut outcome.errors,
            )
            .await;
        outcome.synced_messages = synced_messages;

        let total_users = self.store.count_users(&guild_id_str).await?;
        let total_roles = self.store.count_roles(&guild_id_str).await?;
        let total_messages = self.store.count_messages(&guild_id_str).await?;
        // keep the prior high-water mark if this pass didn't see anything
        // newer, so a pass with zero new messages doesn't regress the
        // incremental stop-condition back to nothing.
        let next_message_id = newest_message_id.or(last_message_id);
        self.store
            .upsert_guild_sync(
                &guild_id_str,
                Utc::now(),
                next_message_id.as_deref(),
                total_users as i32,
                total_messages as i32,
                total_roles as i32,
                true,
            )
            .await?;

        Ok(outcome)
    }

    async fn sync_roles(&self, guild_id: Id<GuildMarker>, remote: &dyn RemoteGuild, errors: &mut Vec<String>) -> u64 {
        let roles = match remote.fetch_all_roles(guild_id).await {
            Ok(roles) => roles,
            Err(e) => {
                errors.push(format!("fetch_all_roles: {e}"));
                return 0;
            }
        };
        let mut synced = 0u64;
        for role in roles {
            let result = self
                .store
                .upsert_role(
                    &guild_id.to_string(),
                    &role.id.to_string(),
                    &role.name,
                    role.color as i32,
                    role.mentionable,
                )
                .await;
            match result {
                Ok(_) => synced += 1,
                Err(e) => errors.push(format!("upsert_role({}): {e}", role.id)),
            }
        }
        synced
    }

    async fn sync_users(&self, guild_id: Id<GuildMarker>, remote: &dyn RemoteGuild, errors: &mut Vec<String>) -> u64 {
        let members = match remote.fetch_all_members(guild_id).await {
            Ok(members) => members,
            Err(e) => {
                errors.push(format!("fetch_all_members: {e}"));
                return 0;
            }
        };
        let mut synced = 0u64;
        for member in members {
            if member.user.bot {
                continue;
            }
            let roles: Vec<String> = member.roles.iter().map(|r| r.to_string()).collect();
            let discriminator = member.user.discriminator().to_string();
            let avatar = member.user.avatar.map(|a| a.to_string());
            let joined_at = timestamp_to_chrono(member.joined_at);
            let result = self
                .store
                .upsert_user(
                    &guild_id.to_string(),
                    &member.user.id.to_string(),
                    member.user.bot,
                    &member.user.name,
                    member.nick.as_deref(),
                    Some(discriminator.as_str()),
                    avatar.as_deref(),
                    &roles,
                    Some(joined_at),
                )
                .await;
            match result {
                Ok(_) => synced += 1,
                Err(e) => errors.push(format!("upsert_user({}): {e}", member.user.id)),
            }
        }
        synced
    }

    /// Returns the number of messages inserted and the highest (newest)
    /// message id observed across every channel in this pass, which becomes
    /// the next `lastMessageId` stop-condition (§4.F, §6 `guild_syncs`).
    async fn sync_messages(
        &self,
        guild_id: Id<GuildMarker>,
        remote: &dyn RemoteGuild,
        per_channel_limit: usize,
        stop_at_message_id: Option<&str>,
        errors: &mut Vec<String>,
    ) -> (u64, Option<String>) {
        let channels = match remote.text_channel_ids(guild_id).await {
            Ok(channels) => channels,
            Err(e) => {
                errors.push(format!("text_channel_ids: {e}"));
                return (0, None);
            }
        };

        let mut total_synced = 0u64;
        let mut newest_seen: Option<Id<MessageMarker>> = None;
        for channel_id in channels {
            let mut before = None;
            let mut processed_for_channel = 0usize;

            loop {
                if processed_for_channel >= per_channel_limit {
                    break;
                }
                let page = match remote.fetch_messages_page(channel_id, before).await {
                    Ok(page) => page,
                    Err(e) => {
                        errors.push(format!("fetch_messages_page({channel_id}): {e}"));
                        break;
                    }
                };
                if page.messages.is_empty() {
                    break;
                }

                let mut hit_known = false;
                for message in &page.messages {
                    newest_seen = Some(newest_seen.map_or(message.id, |best| best.max(message.id)));
                    if let Some(stop_id) = stop_at_message_id {
                        if message.id.to_string() == stop_id {
                            hit_known = true;
                            break;
                        }
                    }
                    if message.author.bot {
                        continue;
                    }
                    if message.content.starts_with("m!") {
                        continue;
                    }
                    if self.author_has_bot_role(remote, guild_id, message.author.id.to_string()).await {
                        continue;
                    }

                    let mentions: Vec<String> = message.mentions.iter().map(|m| m.id.to_string()).collect();
                    let reply_to = message
                        .reference
                        .as_ref()
                        .and_then(|r| r.message_id)
                        .map(|id| id.to_string());

                    match self
                        .store
                        .insert_message(
                            &message.id.to_string(),
                            &message.content,
                            &message.author.id.to_string(),
                            &channel_id.to_string(),
                            &guild_id.to_string(),
                            timestamp_to_chrono(message.timestamp),
                            &mentions,
                            reply_to.as_deref(),
                        )
                        .await
                    {
                        Ok(Some(_)) => {
                            total_synced += 1;
                            processed_for_channel += 1;
                        }
                        Ok(None) => {} // already present, skip
                        Err(e) => errors.push(format!("insert_message({}): {e}", message.id)),
                    }

                    if processed_for_channel >= per_channel_limit {
                        break;
                    }
                }

                let full_batch = page.messages.len() >= PAGE_SIZE;
                before = page.messages.last().map(|m| m.id);
                if hit_known || !full_batch || !page.has_more {
                    break;
                }
                sleep(PAGE_DELAY).await;
            }
        }
        (total_synced, newest_seen.map(|id| id.to_string()))
    }

    async fn author_has_bot_role(
        &self,
        _remote: &dyn RemoteGuild,
        guild_id: Id<GuildMarker>,
        author_id: String,
    ) -> bool {
        match self.store.get_role_ids(&guild_id.to_string(), &author_id).await {
            Ok(Some(role_ids)) => {
                let roles = self.store.list_roles(&guild_id.to_string()).await.unwrap_or_default();
                role_ids.iter().any(|rid| {
                    roles
                        .iter()
                        .any(|r| &r.discord_id == rid && r.name.eq_ignore_ascii_case("bot"))
                })
            }
            _ => false,
        }
    }
}
