use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use guildwarden::{Config, Server};
use tracing_subscriber::EnvFilter;
use twilight_model::channel::Message;
use twilight_model::guild::{Member, Role};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use twilight_model::id::Id;

/// Placeholder for the gateway/REST adapter that wires a live Discord
/// connection to [`RemoteGuild`] — building that adapter is outside this
/// crate's scope (it owns the websocket session, REST rate limiting, and
/// event decoding). This stub lets the core start and serve its
/// liveness/readiness surface and health watchdog without one; every call
/// into the remote guild fails, which the watchdog and engines already
/// treat as a transient remote failure rather than a crash.
struct UnconnectedRemote;

#[async_trait]
impl guildwarden::remote::RemoteGuild for UnconnectedRemote {
    async fn member_count(&self, _guild_id: Id<GuildMarker>) -> guildwarden::error::SyncResult<u64> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn role_count(&self, _guild_id: Id<GuildMarker>) -> guildwarden::error::SyncResult<u64> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn fetch_all_members(&self, _guild_id: Id<GuildMarker>) -> guildwarden::error::SyncResult<Vec<Member>> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn fetch_all_roles(&self, _guild_id: Id<GuildMarker>) -> guildwarden::error::SyncResult<Vec<Role>> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn fetch_messages_page(
        &self,
        _channel_id: Id<ChannelMarker>,
        _before: Option<Id<MessageMarker>>,
    ) -> guildwarden::error::SyncResult<guildwarden::remote::MessagePage> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn text_channel_ids(&self, _guild_id: Id<GuildMarker>) -> guildwarden::error::SyncResult<Vec<Id<ChannelMarker>>> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn fetch_message(
        &self,
        _channel_id: Id<ChannelMarker>,
        _message_id: Id<MessageMarker>,
    ) -> guildwarden::error::SyncResult<Option<Message>> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn star_reaction_count(
        &self,
        _channel_id: Id<ChannelMarker>,
        _message_id: Id<MessageMarker>,
    ) -> guildwarden::error::SyncResult<u64> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn post_embed(
        &self,
        _channel_id: Id<ChannelMarker>,
        _description: &str,
    ) -> guildwarden::error::SyncResult<Id<MessageMarker>> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn post_embed_with_video(
        &self,
        _channel_id: Id<ChannelMarker>,
        _description: &str,
        _video_url: &str,
    ) -> guildwarden::error::SyncResult<Id<MessageMarker>> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn edit_embed(
        &self,
        _channel_id: Id<ChannelMarker>,
        _message_id: Id<MessageMarker>,
        _description: &str,
    ) -> guildwarden::error::SyncResult<()> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn delete_message(
        &self,
        _channel_id: Id<ChannelMarker>,
        _message_id: Id<MessageMarker>,
    ) -> guildwarden::error::SyncResult<()> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn message_exists(
        &self,
        _channel_id: Id<ChannelMarker>,
        _message_id: Id<MessageMarker>,
    ) -> guildwarden::error::SyncResult<bool> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn rename_channel(&self, _channel_id: Id<ChannelMarker>, _name: &str) -> guildwarden::error::SyncResult<()> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn set_owner_overrides(
        &self,
        _channel_id: Id<ChannelMarker>,
        _user_id: Id<UserMarker>,
        _overrides: &guildwarden::remote::PermissionOverrides,
    ) -> guildwarden::error::SyncResult<()> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }

    async fn clear_overrides(
        &self,
        _channel_id: Id<ChannelMarker>,
        _user_id: Id<UserMarker>,
    ) -> guildwarden::error::SyncResult<()> {
        Err(guildwarden::error::SyncError::Remote("no gateway/REST adapter configured".into()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let filter = EnvFilter::from_default_env().add_directive("guildwarden=info".parse()?);
    if config.json_logs() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(guild_id = config.guild_id, port = config.port, "starting guildwarden");

    let server = Server::new(config);
    server.run(Arc::new(UnconnectedRemote)).await
}
