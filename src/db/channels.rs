//! Channel records (§6 `channels`), tracking voice-channel ownership state.

use super::models::ChannelRow;
use super::Store;
use crate::error::StoreResult;

impl Store {
    pub async fn get_channel(&self, discord_id: &str) -> StoreResult<Option<ChannelRow>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT discord_id, guild_id, channel_name, position, is_active, active_user_ids,
                    member_count, created_at, updated_at
             FROM channels WHERE discord_id = $1",
        )
        .bind(discord_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn upsert_channel(
        &self,
        discord_id: &str,
        guild_id: &str,
        channel_name: &str,
        position: i32,
    ) -> StoreResult<ChannelRow> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            INSERT INTO channels (discord_id, guild_id, channel_name, position, is_active,
                                   active_user_ids, member_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, '{}', 0, now(), now())
            ON CONFLICT (discord_id) DO UPDATE SET
                channel_name = EXCLUDED.channel_name,
                position = EXCLUDED.position,
                is_active = TRUE,
                updated_at = now()
            RETURNING discord_id, guild_id, channel_name, position, is_active, active_user_ids,
                      member_count, created_at, updated_at
            "#,
        )
        .bind(discord_id)
        .bind(guild_id)
        .bind(channel_name)
        .bind(position)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn mark_channel_removed(&self, discord_id: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE channels SET is_active = FALSE, active_user_ids = '{}', member_count = 0,
                                  updated_at = now()
             WHERE discord_id = $1",
        )
        .bind(discord_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Replaces the channel's present-user roster, matching §4.D's
    /// reconciliation of `activeUserIds`/`memberCount` after every join,
    /// leave, or move.
    pub async fn set_channel_roster(
        &self,
        discord_id: &str,
        user_ids: &[String],
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE channels SET active_user_ids = $2, member_count = $3, updated_at = now()
             WHERE discord_id = $1",
        )
        .bind(discord_id)
        .bind(user_ids)
        .bind(user_ids.len() as i32)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn rename_channel(&self, discord_id: &str, name: &str) -> StoreResult<()> {
        sqlx::query("UPDATE channels SET channel_name = $2, updated_at = now() WHERE discord_id = $1")
            .bind(discord_id)
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
