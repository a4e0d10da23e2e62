//! Starboard Reconciliation Engine (§4.H): threshold-based promotion of
//! messages, idempotent re-sync, and reply-context pairing.
//!
//! Every mutation for a single source message id is serialized through
//! [`KeyedLocks`] (§5) so a rapid add/remove flurry on the same message can't
//! race itself into a duplicate or orphaned entry.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker};
use twilight_model::id::Id;

use crate::datacache::DataCache;
use crate::db::models::StarboardEntryRow;
use crate::error::CoreResult;
use crate::locks::KeyedLocks;
use crate::remote::RemoteGuild;

/// Marks a starboard message as the reply-context embed for the starred
/// message that immediately follows it, so reconciliation and demotion can
/// find and remove it without a dedicated schema column (§6 schema is fixed;
/// this is a content convention, not storage).
const CONTEXT_MARKER: &str = "\u{21aa} replying to";

const RECONCILE_WINDOW: ChronoDuration = ChronoDuration::hours(24);

pub struct StarboardEngine {
    data_cache: DataCache,
    locks: KeyedLocks<String>,
    starboard_channel_id: Id<ChannelMarker>,
    threshold: i32,
}

impl StarboardEngine {
    pub fn new(data_cache: DataCache, starboard_channel_id: Id<ChannelMarker>, threshold: i32) -> Self {
        Self { data_cache, locks: KeyedLocks::new(), starboard_channel_id, threshold }
    }

    /// Entry point for both reaction-add and reaction-remove gateway events —
    /// both just trigger a recheck of the current count against the
    /// threshold (§4.H).
    pub async fn handle_reaction_change(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        remote: &dyn RemoteGuild,
    ) -> CoreResult<()> {
        let _guard = self.locks.lock(message_id.to_string()).await;

        let Some(message) = remote.fetch_message(channel_id, message_id).await.map_err(crate::error::CoreError::from)? else {
            return Ok(());
        };
        let count = remote.star_reaction_count(channel_id, message_id).await.map_err(crate::error::CoreError::from)?;

        let existing = self
            .data_cache
            .get_starboard_entry(&guild_id.to_string(), &message_id.to_string())
            .await?;

        match existing {
            None if count as i32 >= self.threshold => {
                self.create_entry(guild_id, channel_id, &message, count as i32, remote).await?;
            }
            Some(entry) if count as i32 >= self.threshold => {
                if entry.star_count != count as i32 {
                    self.edit_entry(&entry, count as i32, remote).await?;
                }
            }
            Some(entry) => {
                self.demote_entry(&entry, remote).await?;
            }
            None => {}
        }
        Ok(())
    }

    async fn create_entry(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
        message: &twilight_model::channel::Message,
        star_count: i32,
        remote: &dyn RemoteGuild,
    ) -> CoreResult<()> {
        // reply-context pairing: post the parent first, falling back to a
        // plain single-embed entry on any failure fetching or posting it.
        if let Some(parent_id) = message.reference.as_ref().and_then(|r| r.message_id) {
            match remote.fetch_message(channel_id, parent_id).await {
                Ok(Some(parent)) => {
                    let context_desc = format!(
                        "{CONTEXT_MARKER} **{}**\n{}",
                        parent.author.name, parent.content
                    );
                    if remote.post_embed(self.starboard_channel_id, &context_desc).await.is_err() {
                        tracing::warn!(message_id = %message.id, "reply-context post failed, falling back to single embed");
                    }
                }
                Ok(None) => {
                    tracing::warn!(message_id = %message.id, "reply parent deleted, falling back to single embed");
                }
                Err(e) => {
                    tracing::warn!(message_id = %message.id, error = %e, "reply-context fetch failed, falling back to single embed");
                }
            }
        }

        let description = format!("{}\n— <#{}>", message.content, channel_id);
        let video = message
            .attachments
            .iter()
            .find(|a| a.content_type.as_deref().is_some_and(|ct| ct.starts_with("video")));

        let starred_message_id = match video {
            Some(attachment) => remote
                .post_embed_with_video(self.starboard_channel_id, &description, &attachment.url)
                .await
                .map_err(crate::error::CoreError::from)?,
            None => remote
                .post_embed(self.starboard_channel_id, &description)
                .await
                .map_err(crate::error::CoreError::from)?,
        };

        let entry = StarboardEntryRow {
            guild_id: guild_id.to_string(),
            original_message_id: message.id.to_string(),
            original_channel_id: channel_id.to_string(),
            starboard_message_id: starred_message_id.to_string(),
            starboard_channel_id: self.starboard_channel_id.to_string(),
            star_count,
            created_at: Utc::now(),
            last_updated: Utc::now(),
        };
        self.data_cache.store().insert_starboard_entry(
            &entry.guild_id,
            &entry.original_message_id,
            &entry.original_channel_id,
            &entry.starboard_message_id,
            &entry.starboard_channel_id,
            entry.star_count,
        ).await?;
        self.data_cache.put_starboard_entry(&entry).await;
        tracing::info!(message_id = %message.id, star_count, "starboard entry created");
        Ok(())
    }

    async fn edit_entry(
        &self,
        entry: &StarboardEntryRow,
        star_count: i32,
        remote: &dyn RemoteGuild,
    ) -> CoreResult<()> {
        let channel: Id<ChannelMarker> = self.parse_channel(&entry.starboard_channel_id)?;
        let message: Id<MessageMarker> = self.parse_message(&entry.starboard_message_id)?;
        let description = format!("starred message ({star_count} \u{2b50})");
        if let Err(e) = remote.edit_embed(channel, message, &description).await {
            tracing::warn!(original_message_id = %entry.original_message_id, error = %e, "starboard edit failed");
            return Ok(());
        }
        self.data_cache.store().update_star_count(&entry.guild_id, &entry.original_message_id, star_count).await?;
        let mut updated = entry.clone();
        updated.star_count = star_count;
        updated.last_updated = Utc::now();
        self.data_cache.put_starboard_entry(&updated).await;
        Ok(())
    }

    async fn demote_entry(&self, entry: &StarboardEntryRow, remote: &dyn RemoteGuild) -> CoreResult<()> {
        let channel: Id<ChannelMarker> = self.parse_channel(&entry.starboard_channel_id)?;
        let message: Id<MessageMarker> = self.parse_message(&entry.starboard_message_id)?;

        if let Some(context_id) = self.find_context_message(channel, message, remote).await {
            let _ = remote.delete_message(channel, context_id).await;
        }
        let _ = remote.delete_message(channel, message).await;

        self.data_cache.delete_starboard_entry(&entry.guild_id, &entry.original_message_id).await?;
        tracing::info!(original_message_id = %entry.original_message_id, "starboard entry demoted below threshold");
        Ok(())
    }

    /// Looks for the reply-context embed immediately preceding the starred
    /// message in the starboard channel, identified by its content marker.
    async fn find_context_message(
        &self,
        channel: Id<ChannelMarker>,
        starred: Id<MessageMarker>,
        remote: &dyn RemoteGuild,
    ) -> Option<Id<MessageMarker>> {
        let page = remote.fetch_messages_page(channel, Some(starred)).await.ok()?;
        let preceding = page.messages.first()?;
        if preceding.content.to_lowercase().starts_with(CONTEXT_MARKER) {
            Some(preceding.id)
        } else {
            None
        }
    }

    /// Every 30 minutes (configurable), scans recent messages across text
    /// channels and repairs any starboard entry that has drifted from the
    /// remote reaction count, gone missing, or was never created (§4.H
    /// reconciliation).
    pub async fn reconcile(&self, guild_id: Id<GuildMarker>, remote: &dyn RemoteGuild) -> CoreResult<()> {
        let guild_id_str = guild_id.to_string();
        let since: DateTime<Utc> = Utc::now() - RECONCILE_WINDOW;
        let recent = self.data_cache.store().messages_since(&guild_id_str, since).await?;

        for message_row in recent {
            let channel_id: Id<ChannelMarker> = match message_row.channel_id.parse() {
                Ok(id) => id,
                Err(_) => continue,
            };
            let message_id: Id<MessageMarker> = match message_row.discord_id.parse() {
                Ok(id) => id,
                Err(_) => continue,
            };

            let count = match remote.star_reaction_count(channel_id, message_id).await {
                Ok(c) => c as i32,
                Err(e) => {
                    tracing::warn!(message_id = %message_row.discord_id, error = %e, "reconcile: count fetch failed");
                    continue;
                }
            };
            if count < self.threshold {
                continue;
            }

            let existing = self.data_cache.store().get_starboard_entry(&guild_id_str, &message_row.discord_id).await?;
            match existing {
                None => {
                    if let Ok(Some(message)) = remote.fetch_message(channel_id, message_id).await {
                        self.create_entry(guild_id, channel_id, &message, count, remote).await?;
                    }
                }
                Some(entry) => {
                    let starboard_message: Id<MessageMarker> = match entry.starboard_message_id.parse() {
                        Ok(id) => id,
                        Err(_) => continue,
                    };
                    let starboard_channel: Id<ChannelMarker> = match entry.starboard_channel_id.parse() {
                        Ok(id) => id,
                        Err(_) => continue,
                    };
                    let still_there = remote.message_exists(starboard_channel, starboard_message).await.unwrap_or(false);
                    if !still_there {
                        self.data_cache.delete_starboard_entry(&guild_id_str, &entry.original_message_id).await?;
                        if let Ok(Some(message)) = remote.fetch_message(channel_id, message_id).await {
                            self.create_entry(guild_id, channel_id, &message, count, remote).await?;
                        }
                    } else if entry.star_count != count {
                        self.edit_entry(&entry, count, remote).await?;
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_channel(&self, raw: &str) -> CoreResult<Id<ChannelMarker>> {
        raw.parse().map_err(|_| crate::error::CoreError::Config("invalid channel id".into()))
    }

    fn parse_message(&self, raw: &str) -> CoreResult<Id<MessageMarker>> {
        raw.parse().map_err(|_| crate::error::CoreError::Config("invalid message id".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_marker_matches_lowercased_prefix() {
        let content = "\u{21aa} replying to **alice**\nhello there".to_lowercase();
        assert!(content.starts_with(CONTEXT_MARKER));
    }
}
