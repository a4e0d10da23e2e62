//! Voice session records (§6 `voice_channel_sessions`).
//!
//! The active-session invariant (§8 invariant 1: at most one open session per
//! user) is enforced by the partial unique index in the migration; these
//! helpers only ever touch the row for the caller's own user inside a single
//! transaction, so a conflict here means the tracker's caller skipped the
//! keyed lock rather than a schema bug.

use chrono::{DateTime, Utc};
use sqlx::Postgres;

use super::models::VoiceSessionRow;
use super::Store;
use crate::error::StoreResult;

impl Store {
    pub async fn start_session(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        user_id: &str,
        guild_id: &str,
        channel_id: &str,
        channel_name: Option<&str>,
        joined_at: DateTime<Utc>,
    ) -> StoreResult<VoiceSessionRow> {
        let row = sqlx::query_as::<_, VoiceSessionRow>(
            r#"
            INSERT INTO voice_channel_sessions
                (user_id, guild_id, channel_id, channel_name, joined_at, is_active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING id, user_id, guild_id, channel_id, channel_name, joined_at, left_at,
                      duration, is_active
            "#,
        )
        .bind(user_id)
        .bind(guild_id)
        .bind(channel_id)
        .bind(channel_name)
        .bind(joined_at)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Closes the caller's currently-open session on `channel_id`, if any,
    /// recording `left_at` and the elapsed `duration` in whole seconds.
    pub async fn end_active_session(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        user_id: &str,
        channel_id: &str,
        left_at: DateTime<Utc>,
    ) -> StoreResult<Option<VoiceSessionRow>> {
        let row = sqlx::query_as::<_, VoiceSessionRow>(
            r#"
            UPDATE voice_channel_sessions
            SET left_at = $3,
                duration = GREATEST(0, EXTRACT(EPOCH FROM ($3 - joined_at))::INTEGER),
                is_active = FALSE
            WHERE user_id = $1 AND channel_id = $2 AND is_active
            RETURNING id, user_id, guild_id, channel_id, channel_name, joined_at, left_at,
                      duration, is_active
            "#,
        )
        .bind(user_id)
        .bind(channel_id)
        .bind(left_at)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    pub async fn get_active_session(&self, user_id: &str) -> StoreResult<Option<VoiceSessionRow>> {
        let row = sqlx::query_as::<_, VoiceSessionRow>(
            "SELECT id, user_id, guild_id, channel_id, channel_name, joined_at, left_at,
                    duration, is_active
             FROM voice_channel_sessions WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn active_sessions_in_channel(
        &self,
        channel_id: &str,
    ) -> StoreResult<Vec<VoiceSessionRow>> {
        let rows = sqlx::query_as::<_, VoiceSessionRow>(
            "SELECT id, user_id, guild_id, channel_id, channel_name, joined_at, left_at,
                    duration, is_active
             FROM voice_channel_sessions WHERE channel_id = $1 AND is_active",
        )
        .bind(channel_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Total historical seconds a user has spent in a channel, counting the
    /// still-open session's elapsed time as of `now` (§4.E election).
    pub async fn cumulative_duration(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let row: (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(
                CASE WHEN is_active THEN GREATEST(0, EXTRACT(EPOCH FROM ($3 - joined_at))::BIGINT)
                     ELSE duration::BIGINT
                END
            ), 0)
            FROM voice_channel_sessions WHERE channel_id = $1 AND user_id = $2
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(row.0.unwrap_or(0))
    }

    /// Longest-standing user to have ever held a session on this channel
    /// (earliest `joined_at`), used as the ownership-election fallback when
    /// no one is currently present.
    pub async fn longest_standing_historical_user(
        &self,
        channel_id: &str,
    ) -> StoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT user_id FROM voice_channel_sessions
             WHERE channel_id = $1
             ORDER BY joined_at ASC
             LIMIT 1",
        )
        .bind(channel_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Force-closes active sessions whose channel no longer exists or whose
    /// user is no longer in that channel's active roster (health watchdog
    /// maintenance, §4.G) — the gateway connection that would have reported
    /// the leave event was itself lost. Unlike a wall-clock age cutoff, this
    /// never touches a session that's still genuinely valid, however long
    /// it's been open.
    pub async fn close_stale_sessions(&self, guild_id: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE voice_channel_sessions vcs
            SET left_at = $2,
                duration = GREATEST(0, EXTRACT(EPOCH FROM ($2 - vcs.joined_at))::INTEGER),
                is_active = FALSE
            WHERE vcs.guild_id = $1
              AND vcs.is_active
              AND NOT EXISTS (
                  SELECT 1 FROM channels c
                  WHERE c.discord_id = vcs.channel_id
                    AND c.is_active
                    AND vcs.user_id = ANY (c.active_user_ids)
              )
            "#,
        )
        .bind(guild_id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
