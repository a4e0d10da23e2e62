//! Guild sync bookkeeping (§6 `guild_syncs`).

use chrono::{DateTime, Utc};

use super::models::GuildSyncRow;
use super::Store;
use crate::error::StoreResult;

impl Store {
    pub async fn get_guild_sync(&self, guild_id: &str) -> StoreResult<Option<GuildSyncRow>> {
        let row = sqlx::query_as::<_, GuildSyncRow>(
            "SELECT guild_id, last_sync_at, last_message_id, total_users, total_messages,
                    total_roles, is_fully_synced
             FROM guild_syncs WHERE guild_id = $1",
        )
        .bind(guild_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_guild_sync(
        &self,
        guild_id: &str,
        last_sync_at: DateTime<Utc>,
        last_message_id: Option<&str>,
        total_users: i32,
        total_messages: i32,
        total_roles: i32,
        is_fully_synced: bool,
    ) -> StoreResult<GuildSyncRow> {
        let row = sqlx::query_as::<_, GuildSyncRow>(
            r#"
            INSERT INTO guild_syncs (guild_id, last_sync_at, last_message_id, total_users,
                                      total_messages, total_roles, is_fully_synced)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (guild_id) DO UPDATE SET
                last_sync_at = EXCLUDED.last_sync_at,
                last_message_id = COALESCE(EXCLUDED.last_message_id, guild_syncs.last_message_id),
                total_users = EXCLUDED.total_users,
                total_messages = EXCLUDED.total_messages,
                total_roles = EXCLUDED.total_roles,
                is_fully_synced = EXCLUDED.is_fully_synced
            RETURNING guild_id, last_sync_at, last_message_id, total_users, total_messages,
                      total_roles, is_fully_synced
            "#,
        )
        .bind(guild_id)
        .bind(last_sync_at)
        .bind(last_message_id)
        .bind(total_users)
        .bind(total_messages)
        .bind(total_roles)
        .bind(is_fully_synced)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }
}
