//! Message records (§6 `messages`).
//!
//! Messages are append-mostly: the guild sync engine inserts history it
//! hasn't seen yet and skips what's already present (§4.F), the affinity
//! engine scans mentions/replies to accumulate interaction weight (§4.I), and
//! the starboard reconciliation sweep re-reads recent messages to recheck
//! reaction state (§4.H).

use chrono::{DateTime, Utc};

use super::models::MessageRow;
use super::Store;
use crate::error::StoreResult;

impl Store {
    pub async fn message_exists(&self, discord_id: &str) -> StoreResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM messages WHERE discord_id = $1")
            .bind(discord_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn insert_message(
        &self,
        discord_id: &str,
        content: &str,
        author_id: &str,
        channel_id: &str,
        guild_id: &str,
        timestamp: DateTime<Utc>,
        mentions: &[String],
        reply_to: Option<&str>,
    ) -> StoreResult<Option<MessageRow>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (discord_id, content, author_id, channel_id, guild_id,
                                   timestamp, mentions, reply_to)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (discord_id) DO NOTHING
            RETURNING id, discord_id, content, author_id, channel_id, guild_id, timestamp,
                      deleted_at, mentions, reply_to
            "#,
        )
        .bind(discord_id)
        .bind(content)
        .bind(author_id)
        .bind(channel_id)
        .bind(guild_id)
        .bind(timestamp)
        .bind(mentions)
        .bind(reply_to)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn mark_message_deleted(&self, discord_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE messages SET deleted_at = now() WHERE discord_id = $1")
            .bind(discord_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn get_message(&self, discord_id: &str) -> StoreResult<Option<MessageRow>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, discord_id, content, author_id, channel_id, guild_id, timestamp,
                    deleted_at, mentions, reply_to
             FROM messages WHERE discord_id = $1",
        )
        .bind(discord_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn messages_since(
        &self,
        guild_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<MessageRow>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, discord_id, content, author_id, channel_id, guild_id, timestamp,
                    deleted_at, mentions, reply_to
             FROM messages
             WHERE guild_id = $1 AND timestamp >= $2 AND deleted_at IS NULL
             ORDER BY timestamp ASC",
        )
        .bind(guild_id)
        .bind(since)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn count_messages(&self, guild_id: &str) -> StoreResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT count(*) FROM messages WHERE guild_id = $1")
            .bind(guild_id)
            .fetch_one(self.pool())
            .await?;
        Ok(count.0)
    }
}
