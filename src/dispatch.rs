//! Event Dispatch Edge (§6 "Upstream event dispatch"): adapts gateway events
//! into operations on the voice tracker, ownership engine, starboard engine,
//! and affinity engine, with per-event latency metrics.
//!
//! Every `on_*` handler is wrapped so a handler exceeding one second is
//! logged as slow, and any error it returns is logged rather than propagated
//! — per §7, "one bad event cannot crash the process."

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use twilight_model::channel::Message;
use twilight_model::guild::Member;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use twilight_model::id::Id;

use crate::affinity::AffinityEngine;
use crate::db::Store;
use crate::error::CoreResult;
use crate::ownership::OwnershipEngine;
use crate::remote::RemoteGuild;
use crate::starboard::StarboardEngine;
use crate::voice::VoiceTracker;

const SLOW_HANDLER_THRESHOLD: Duration = Duration::from_secs(1);

/// A voice channel's identity as reported alongside a voice-state update —
/// `None` when the user isn't in a voice channel at all.
#[derive(Debug, Clone)]
pub struct VoiceChannelRef {
    pub id: Id<ChannelMarker>,
    pub name: String,
    pub position: i32,
}

pub struct EventDispatcher {
    voice: VoiceTracker,
    ownership: OwnershipEngine,
    starboard: Option<Arc<StarboardEngine>>,
    affinity: AffinityEngine,
    store: Store,
}

impl EventDispatcher {
    pub fn new(
        voice: VoiceTracker,
        ownership: OwnershipEngine,
        starboard: Option<Arc<StarboardEngine>>,
        affinity: AffinityEngine,
        store: Store,
    ) -> Self {
        Self { voice, ownership, starboard, affinity, store }
    }

    async fn timed<F>(&self, name: &'static str, fut: F)
    where
        F: std::future::Future<Output = CoreResult<()>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let elapsed = start.elapsed();
        if elapsed > SLOW_HANDLER_THRESHOLD {
            tracing::warn!(handler = name, duration_ms = elapsed.as_millis() as u64, "slow handler");
        } else {
            tracing::debug!(handler = name, duration_ms = elapsed.as_millis() as u64, "handler completed");
        }
        if let Err(e) = result {
            tracing::error!(handler = name, error = %e, "handler returned an error");
        }
    }

    /// Voice-state-change dispatch: classifies the transition (join, leave,
    /// move) from the presence/absence of `old`/`new` channel refs, tracks
    /// it, then re-validates ownership and naming for whichever channel(s)
    /// were touched (§4.D, §4.E).
    pub async fn on_voice_state_update(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
        bot: bool,
        old: Option<VoiceChannelRef>,
        new: Option<VoiceChannelRef>,
        remote: &dyn RemoteGuild,
    ) {
        self.timed("voice_state_update", async {
            let guild = guild_id.to_string();
            let user = user_id.to_string();

            match (old, new) {
                (None, Some(joined)) => {
                    self.voice
                        .track_join(&user, &guild, bot, &joined.id.to_string(), &joined.name, joined.position)
                        .await?;
                    self.settle_channel(&guild, &joined.id.to_string(), &joined.name, remote).await?;
                }
                (Some(left), None) => {
                    self.handle_departure(&user, &guild, &left.id.to_string(), remote).await?;
                }
                (Some(left), Some(joined)) if left.id != joined.id => {
                    self.voice
                        .track_move(
                            &user,
                            &guild,
                            bot,
                            &left.id.to_string(),
                            &joined.id.to_string(),
                            &joined.name,
                            joined.position,
                        )
                        .await?;
                    self.handle_departure(&user, &guild, &left.id.to_string(), remote).await?;
                    self.settle_channel(&guild, &joined.id.to_string(), &joined.name, remote).await?;
                }
                _ => {} // same channel, e.g. a mute/deafen toggle; nothing to track
            }
            Ok(())
        })
        .await;
    }

    async fn handle_departure(
        &self,
        user_id: &str,
        guild_id: &str,
        channel_id: &str,
        remote: &dyn RemoteGuild,
    ) -> CoreResult<()> {
        self.voice.track_leave(user_id, guild_id, channel_id).await?;
        if let Some(owner) = self.ownership_owner_of(channel_id).await {
            if owner == user_id {
                self.ownership.transfer_on_leave(channel_id, user_id, remote).await?;
            }
        }
        Ok(())
    }

    async fn ownership_owner_of(&self, channel_id: &str) -> Option<String> {
        self.ownership.ensure_valid_owner(channel_id).await.ok().flatten()
    }

    async fn settle_channel(
        &self,
        guild_id: &str,
        channel_id: &str,
        current_name: &str,
        remote: &dyn RemoteGuild,
    ) -> CoreResult<()> {
        let Some(owner_id) = self.ownership.ensure_valid_owner(channel_id).await? else {
            return Ok(());
        };
        let owner = self.store.get_user(guild_id, &owner_id).await?;
        let display_name = owner
            .as_ref()
            .map(|u| u.display_name.clone().unwrap_or_else(|| u.username.clone()))
            .unwrap_or_else(|| owner_id.clone());
        let preferred_name = self.store.get_mod_preferences(guild_id, &owner_id).await.ok().flatten().and_then(|prefs| {
            prefs.get("preferred_channel_name").and_then(|v| v.as_str()).map(str::to_string)
        });
        self.ownership
            .apply_rename_policy(channel_id, current_name, preferred_name.as_deref(), &display_name, remote)
            .await
    }

    pub async fn on_reaction_add(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        remote: &dyn RemoteGuild,
    ) {
        self.timed("reaction_add", async {
            if let Some(starboard) = &self.starboard {
                starboard.handle_reaction_change(guild_id, channel_id, message_id, remote).await?;
            }
            Ok(())
        })
        .await;
    }

    pub async fn on_reaction_remove(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        remote: &dyn RemoteGuild,
    ) {
        self.timed("reaction_remove", async {
            if let Some(starboard) = &self.starboard {
                starboard.handle_reaction_change(guild_id, channel_id, message_id, remote).await?;
            }
            Ok(())
        })
        .await;
    }

    /// Persists the message (skipping bot authors, matching the sync
    /// engine's own skip policy) and feeds it to the affinity engine.
    pub async fn on_message_create(&self, guild_id: Id<GuildMarker>, message: &Message) {
        self.timed("message_create", async {
            if message.author.bot {
                return Ok(());
            }
            let guild = guild_id.to_string();
            let channel = message.channel_id.to_string();
            let author = message.author.id.to_string();
            let mentions: Vec<String> = message.mentions.iter().map(|m| m.id.to_string()).collect();
            let reply_to = message.reference.as_ref().and_then(|r| r.message_id).map(|id| id.to_string());

            self.store
                .insert_message(
                    &message.id.to_string(),
                    &message.content,
                    &author,
                    &channel,
                    &guild,
                    Utc::now(),
                    &mentions,
                    reply_to.as_deref(),
                )
                .await?;

            self.affinity
                .process_message(&guild, &author, &channel, &mentions, reply_to.as_deref(), Utc::now())
                .await?;
            Ok(())
        })
        .await;
    }

    pub async fn on_message_delete(&self, message_id: Id<MessageMarker>) {
        self.timed("message_delete", async {
            self.store.mark_message_deleted(&message_id.to_string()).await?;
            Ok(())
        })
        .await;
    }

    pub async fn on_member_add(&self, guild_id: Id<GuildMarker>, member: &Member) {
        self.timed("member_add", async { self.upsert_member(guild_id, member).await }).await;
    }

    pub async fn on_member_update(&self, guild_id: Id<GuildMarker>, member: &Member) {
        self.timed("member_update", async { self.upsert_member(guild_id, member).await }).await;
    }

    async fn upsert_member(&self, guild_id: Id<GuildMarker>, member: &Member) -> CoreResult<()> {
        if member.user.bot {
            return Ok(());
        }
        let roles: Vec<String> = member.roles.iter().map(|r| r.to_string()).collect();
        let discriminator = member.user.discriminator().to_string();
        let avatar = member.user.avatar.map(|a| a.to_string());
        self.store
            .upsert_user(
                &guild_id.to_string(),
                &member.user.id.to_string(),
                member.user.bot,
                &member.user.name,
                member.nick.as_deref(),
                Some(discriminator.as_str()),
                avatar.as_deref(),
                &roles,
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn on_ready(&self, guild_id: Id<GuildMarker>) {
        self.timed("ready", async {
            tracing::info!(guild_id = %guild_id, "gateway ready");
            Ok(())
        })
        .await;
    }
}
