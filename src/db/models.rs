//! Row types for the persistent store (§6 schema).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub discord_id: String,
    pub guild_id: String,
    pub bot: bool,
    pub username: String,
    pub display_name: Option<String>,
    pub discriminator: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<String>,
    pub roles: Vec<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    pub username_history: Vec<String>,
    pub display_name_history: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleRow {
    pub id: i64,
    pub discord_id: String,
    pub guild_id: String,
    pub name: String,
    pub color: i32,
    pub mentionable: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub discord_id: String,
    pub content: String,
    pub author_id: String,
    pub channel_id: String,
    pub guild_id: String,
    pub timestamp: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub mentions: Vec<String>,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelRow {
    pub discord_id: String,
    pub guild_id: String,
    pub channel_name: String,
    pub position: i32,
    pub is_active: bool,
    pub active_user_ids: Vec<String>,
    pub member_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoiceSessionRow {
    pub id: i64,
    pub user_id: String,
    pub guild_id: String,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct GuildSyncRow {
    pub guild_id: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_message_id: Option<String>,
    pub total_users: i32,
    pub total_messages: i32,
    pub total_roles: i32,
    pub is_fully_synced: bool,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct StarboardEntryRow {
    pub guild_id: String,
    pub original_message_id: String,
    pub original_channel_id: String,
    pub starboard_message_id: String,
    pub starboard_channel_id: String,
    pub star_count: i32,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RelationshipRow {
    pub user_id1: String,
    pub user_id2: String,
    pub guild_id: String,
    pub affinity_percentage: f64,
    pub interaction_count: i32,
    pub last_interaction: DateTime<Utc>,
}
