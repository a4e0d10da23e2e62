//! User records (§6 `users`).

use chrono::Utc;
use sqlx::Postgres;

use super::models::UserRow;
use super::Store;
use crate::error::StoreResult;

impl Store {
    pub async fn get_user(&self, guild_id: &str, discord_id: &str) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, discord_id, guild_id, bot, username, display_name, discriminator,
                    avatar, status, roles, joined_at, last_seen, username_history,
                    display_name_history, active, created_at, updated_at
             FROM users WHERE guild_id = $1 AND discord_id = $2",
        )
        .bind(guild_id)
        .bind(discord_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn list_active_users(&self, guild_id: &str) -> StoreResult<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, discord_id, guild_id, bot, username, display_name, discriminator,
                    avatar, status, roles, joined_at, last_seen, username_history,
                    display_name_history, active, created_at, updated_at
             FROM users WHERE guild_id = $1 AND active",
        )
        .bind(guild_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn count_users(&self, guild_id: &str) -> StoreResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT count(*) FROM users WHERE guild_id = $1")
            .bind(guild_id)
            .fetch_one(self.pool())
            .await?;
        Ok(count.0)
    }

    /// Upserts a user, appending to the username/display-name history arrays
    /// only when the incoming value actually changed (§4.F rename tracking).
    pub async fn upsert_user(
        &self,
        guild_id: &str,
        discord_id: &str,
        bot: bool,
        username: &str,
        display_name: Option<&str>,
        discriminator: Option<&str>,
        avatar: Option<&str>,
        roles: &[String],
        joined_at: Option<chrono::DateTime<Utc>>,
    ) -> StoreResult<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (discord_id, guild_id, bot, username, display_name, discriminator,
                                avatar, roles, joined_at, last_seen, username_history,
                                display_name_history, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), ARRAY[$4], ARRAY[COALESCE($5, $4)],
                    TRUE, now(), now())
            ON CONFLICT (discord_id, guild_id) DO UPDATE SET
                bot = EXCLUDED.bot,
                username = EXCLUDED.username,
                display_name = EXCLUDED.display_name,
                discriminator = EXCLUDED.discriminator,
                avatar = EXCLUDED.avatar,
                roles = EXCLUDED.roles,
                last_seen = now(),
                active = TRUE,
                username_history = CASE
                    WHEN users.username IS DISTINCT FROM EXCLUDED.username
                    THEN array_append(users.username_history, EXCLUDED.username)
                    ELSE users.username_history
                END,
                display_name_history = CASE
                    WHEN users.display_name IS DISTINCT FROM EXCLUDED.display_name
                    THEN array_append(users.display_name_history, COALESCE(EXCLUDED.display_name, EXCLUDED.username))
                    ELSE users.display_name_history
                END,
                updated_at = now()
            RETURNING id, discord_id, guild_id, bot, username, display_name, discriminator,
                      avatar, status, roles, joined_at, last_seen, username_history,
                      display_name_history, active, created_at, updated_at
            "#,
        )
        .bind(discord_id)
        .bind(guild_id)
        .bind(bot)
        .bind(username)
        .bind(display_name)
        .bind(discriminator)
        .bind(avatar)
        .bind(roles)
        .bind(joined_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn mark_inactive(&self, guild_id: &str, discord_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET active = FALSE, updated_at = now() WHERE guild_id = $1 AND discord_id = $2")
            .bind(guild_id)
            .bind(discord_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_status(
        &self,
        guild_id: &str,
        discord_id: &str,
        status: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET status = $3, updated_at = now() WHERE guild_id = $1 AND discord_id = $2",
        )
        .bind(guild_id)
        .bind(discord_id)
        .bind(status)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_mod_preferences(
        &self,
        guild_id: &str,
        discord_id: &str,
    ) -> StoreResult<Option<serde_json::Value>> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "SELECT mod_preferences FROM users WHERE guild_id = $1 AND discord_id = $2",
        )
        .bind(guild_id)
        .bind(discord_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn set_mod_preferences(
        &self,
        guild_id: &str,
        discord_id: &str,
        prefs: &serde_json::Value,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET mod_preferences = $3, updated_at = now()
             WHERE guild_id = $1 AND discord_id = $2",
        )
        .bind(guild_id)
        .bind(discord_id)
        .bind(prefs)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_role_ids(
        &self,
        guild_id: &str,
        discord_id: &str,
    ) -> StoreResult<Option<Vec<String>>> {
        let row: Option<(Vec<String>,)> =
            sqlx::query_as("SELECT roles FROM users WHERE guild_id = $1 AND discord_id = $2")
                .bind(guild_id)
                .bind(discord_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// Reads the member row's persisted relationship network — the affinity
    /// engine's cache-through store (§4.I: "Persist the list on the member
    /// row"). `None` if the user row doesn't exist yet; `Some(Value::Null)`-ish
    /// default `[]` if it exists but has never been computed.
    pub async fn get_relationships(
        &self,
        guild_id: &str,
        discord_id: &str,
    ) -> StoreResult<Option<serde_json::Value>> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "SELECT relationships FROM users WHERE guild_id = $1 AND discord_id = $2",
        )
        .bind(guild_id)
        .bind(discord_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn set_relationships(
        &self,
        guild_id: &str,
        discord_id: &str,
        relationships: &serde_json::Value,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET relationships = $3, updated_at = now()
             WHERE guild_id = $1 AND discord_id = $2",
        )
        .bind(guild_id)
        .bind(discord_id)
        .bind(relationships)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Touches `last_seen` for an already-known user, or lays down a minimal
    /// placeholder row if this is the first time we've ever seen them (the
    /// voice tracker only has an id at join time; the sync engine is what
    /// fills in the rest on its next pass).
    pub(crate) async fn in_tx_touch_last_seen(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        guild_id: &str,
        discord_id: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (discord_id, guild_id, bot, username, last_seen, username_history,
                                display_name_history, active, created_at, updated_at)
            VALUES ($1, $2, FALSE, $1, now(), ARRAY[$1]::TEXT[], ARRAY[$1]::TEXT[], TRUE, now(), now())
            ON CONFLICT (discord_id, guild_id) DO UPDATE SET last_seen = now()
            "#,
        )
        .bind(discord_id)
        .bind(guild_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
