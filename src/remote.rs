//! The out-of-scope collaborator boundary: everything this crate needs from
//! the chat-platform gateway/REST client, modeled as a trait so the sync
//! engine, ownership engine, and starboard engine can be tested against a
//! fake rather than a live connection.
//!
//! Payload shapes at the dispatch edge reuse `twilight_model` types directly
//! rather than redefining parallel structs.

use async_trait::async_trait;
use twilight_model::channel::Message;
use twilight_model::guild::{Member, Role};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use twilight_model::id::Id;

use crate::error::SyncResult;

#[derive(Debug, Clone)]
pub struct PermissionOverrides {
    pub manage_channel: bool,
    pub priority_speaker: bool,
    pub stream: bool,
    pub voice_activity: bool,
    pub speak: bool,
    pub connect: bool,
    pub create_invite: bool,
}

impl PermissionOverrides {
    pub const OWNER: Self = Self {
        manage_channel: true,
        priority_speaker: true,
        stream: true,
        voice_activity: true,
        speak: true,
        connect: true,
        create_invite: true,
    };
}

pub struct MessagePage {
    pub messages: Vec<Message>,
    /// `false` once the remote returns fewer than a full batch.
    pub has_more: bool,
}

/// Everything the core pulls from or pushes to the remote guild.
#[async_trait]
pub trait RemoteGuild: Send + Sync {
    async fn member_count(&self, guild_id: Id<GuildMarker>) -> SyncResult<u64>;
    async fn role_count(&self, guild_id: Id<GuildMarker>) -> SyncResult<u64>;

    async fn fetch_all_members(&self, guild_id: Id<GuildMarker>) -> SyncResult<Vec<Member>>;
    async fn fetch_all_roles(&self, guild_id: Id<GuildMarker>) -> SyncResult<Vec<Role>>;

    /// Paginates backward from the newest message in a channel, 100 at a
    /// time, starting `before` the given message id (or the newest if
    /// `None`).
    async fn fetch_messages_page(
        &self,
        channel_id: Id<ChannelMarker>,
        before: Option<Id<MessageMarker>>,
    ) -> SyncResult<MessagePage>;

    async fn text_channel_ids(&self, guild_id: Id<GuildMarker>) -> SyncResult<Vec<Id<ChannelMarker>>>;

    async fn fetch_message(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
    ) -> SyncResult<Option<Message>>;

    async fn star_reaction_count(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
    ) -> SyncResult<u64>;

    async fn post_embed(
        &self,
        channel_id: Id<ChannelMarker>,
        description: &str,
    ) -> SyncResult<Id<MessageMarker>>;

    async fn post_embed_with_video(
        &self,
        channel_id: Id<ChannelMarker>,
        description: &str,
        video_url: &str,
    ) -> SyncResult<Id<MessageMarker>>;

    async fn edit_embed(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        description: &str,
    ) -> SyncResult<()>;

    async fn delete_message(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
    ) -> SyncResult<()>;

    async fn message_exists(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
    ) -> SyncResult<bool>;

    async fn rename_channel(&self, channel_id: Id<ChannelMarker>, name: &str) -> SyncResult<()>;

    async fn set_owner_overrides(
        &self,
        channel_id: Id<ChannelMarker>,
        user_id: Id<UserMarker>,
        overrides: &PermissionOverrides,
    ) -> SyncResult<()>;

    async fn clear_overrides(
        &self,
        channel_id: Id<ChannelMarker>,
        user_id: Id<UserMarker>,
    ) -> SyncResult<()>;
}
