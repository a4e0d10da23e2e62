//! Starboard entries (§6 `starboard_entries`).

use chrono::{DateTime, Utc};

use super::models::StarboardEntryRow;
use super::Store;
use crate::error::StoreResult;

impl Store {
    pub async fn get_starboard_entry(
        &self,
        guild_id: &str,
        original_message_id: &str,
    ) -> StoreResult<Option<StarboardEntryRow>> {
        let row = sqlx::query_as::<_, StarboardEntryRow>(
            "SELECT guild_id, original_message_id, original_channel_id, starboard_message_id,
                    starboard_channel_id, star_count, created_at, last_updated
             FROM starboard_entries WHERE guild_id = $1 AND original_message_id = $2",
        )
        .bind(guild_id)
        .bind(original_message_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_starboard_entry(
        &self,
        guild_id: &str,
        original_message_id: &str,
        original_channel_id: &str,
        starboard_message_id: &str,
        starboard_channel_id: &str,
        star_count: i32,
    ) -> StoreResult<StarboardEntryRow> {
        let row = sqlx::query_as::<_, StarboardEntryRow>(
            r#"
            INSERT INTO starboard_entries
                (guild_id, original_message_id, original_channel_id, starboard_message_id,
                 starboard_channel_id, star_count, created_at, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, now(), now())
            ON CONFLICT (guild_id, original_message_id) DO UPDATE SET
                star_count = EXCLUDED.star_count,
                last_updated = now()
            RETURNING guild_id, original_message_id, original_channel_id, starboard_message_id,
                      starboard_channel_id, star_count, created_at, last_updated
            "#,
        )
        .bind(guild_id)
        .bind(original_message_id)
        .bind(original_channel_id)
        .bind(starboard_message_id)
        .bind(starboard_channel_id)
        .bind(star_count)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn update_star_count(
        &self,
        guild_id: &str,
        original_message_id: &str,
        star_count: i32,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE starboard_entries SET star_count = $3, last_updated = now()
             WHERE guild_id = $1 AND original_message_id = $2",
        )
        .bind(guild_id)
        .bind(original_message_id)
        .bind(star_count)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete_starboard_entry(
        &self,
        guild_id: &str,
        original_message_id: &str,
    ) -> StoreResult<()> {
        sqlx::query("DELETE FROM starboard_entries WHERE guild_id = $1 AND original_message_id = $2")
            .bind(guild_id)
            .bind(original_message_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Entries created or touched since `since`, the reconciliation sweep's
    /// candidate set (§4.H, 30-minute cadence over the last 24h).
    pub async fn starboard_entries_since(
        &self,
        guild_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<StarboardEntryRow>> {
        let rows = sqlx::query_as::<_, StarboardEntryRow>(
            "SELECT guild_id, original_message_id, original_channel_id, starboard_message_id,
                    starboard_channel_id, star_count, created_at, last_updated
             FROM starboard_entries WHERE guild_id = $1 AND created_at >= $2",
        )
        .bind(guild_id)
        .bind(since)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
