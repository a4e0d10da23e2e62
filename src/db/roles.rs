//! Role records (§6 `roles`).

use super::models::RoleRow;
use super::Store;
use crate::error::StoreResult;

impl Store {
    pub async fn list_roles(&self, guild_id: &str) -> StoreResult<Vec<RoleRow>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT id, discord_id, guild_id, name, color, mentionable FROM roles WHERE guild_id = $1",
        )
        .bind(guild_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn count_roles(&self, guild_id: &str) -> StoreResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT count(*) FROM roles WHERE guild_id = $1")
            .bind(guild_id)
            .fetch_one(self.pool())
            .await?;
        Ok(count.0)
    }

    pub async fn upsert_role(
        &self,
        guild_id: &str,
        discord_id: &str,
        name: &str,
        color: i32,
        mentionable: bool,
    ) -> StoreResult<RoleRow> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            INSERT INTO roles (discord_id, guild_id, name, color, mentionable, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now(), now())
            ON CONFLICT (discord_id, guild_id) DO UPDATE SET
                name = EXCLUDED.name,
                color = EXCLUDED.color,
                mentionable = EXCLUDED.mentionable,
                updated_at = now()
            RETURNING id, discord_id, guild_id, name, color, mentionable
            "#,
        )
        .bind(discord_id)
        .bind(guild_id)
        .bind(name)
        .bind(color)
        .bind(mentionable)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }
}
