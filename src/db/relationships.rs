//! Relationship affinity records (§6 `relationships`).
//!
//! Pairs are stored with `user_id1 < user_id2` lexically so each unordered
//! pair has exactly one row; callers normalize before binding.

use chrono::{DateTime, Utc};

use super::models::RelationshipRow;
use super::Store;
use crate::error::StoreResult;

fn normalize_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Store {
    pub async fn get_relationship(
        &self,
        guild_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> StoreResult<Option<RelationshipRow>> {
        let (lo, hi) = normalize_pair(user_a, user_b);
        let row = sqlx::query_as::<_, RelationshipRow>(
            "SELECT user_id1, user_id2, guild_id, affinity_percentage, interaction_count,
                    last_interaction
             FROM relationships WHERE guild_id = $1 AND user_id1 = $2 AND user_id2 = $3",
        )
        .bind(guild_id)
        .bind(lo)
        .bind(hi)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn bump_interaction(
        &self,
        guild_id: &str,
        user_a: &str,
        user_b: &str,
        weight: i32,
        at: DateTime<Utc>,
    ) -> StoreResult<RelationshipRow> {
        let (lo, hi) = normalize_pair(user_a, user_b);
        let row = sqlx::query_as::<_, RelationshipRow>(
            r#"
            INSERT INTO relationships (user_id1, user_id2, guild_id, affinity_percentage,
                                        interaction_count, last_interaction)
            VALUES ($1, $2, $3, 0, $4, $5)
            ON CONFLICT (user_id1, user_id2, guild_id) DO UPDATE SET
                interaction_count = relationships.interaction_count + $4,
                last_interaction = $5
            RETURNING user_id1, user_id2, guild_id, affinity_percentage, interaction_count,
                      last_interaction
            "#,
        )
        .bind(lo)
        .bind(hi)
        .bind(guild_id)
        .bind(weight)
        .bind(at)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn set_affinity_percentage(
        &self,
        guild_id: &str,
        user_a: &str,
        user_b: &str,
        percentage: f64,
    ) -> StoreResult<()> {
        let (lo, hi) = normalize_pair(user_a, user_b);
        sqlx::query(
            "UPDATE relationships SET affinity_percentage = $4
             WHERE guild_id = $1 AND user_id1 = $2 AND user_id2 = $3",
        )
        .bind(guild_id)
        .bind(lo)
        .bind(hi)
        .bind(percentage)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// All relationships touching `user_id`, used to rank the top 50 by raw
    /// interaction count before percentage normalization (§4.I).
    pub async fn relationships_for_user(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<RelationshipRow>> {
        let rows = sqlx::query_as::<_, RelationshipRow>(
            "SELECT user_id1, user_id2, guild_id, affinity_percentage, interaction_count,
                    last_interaction
             FROM relationships
             WHERE guild_id = $1 AND (user_id1 = $2 OR user_id2 = $2)
             ORDER BY interaction_count DESC",
        )
        .bind(guild_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn total_interactions(&self, guild_id: &str, user_id: &str) -> StoreResult<i64> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT SUM(interaction_count)::BIGINT FROM relationships
             WHERE guild_id = $1 AND (user_id1 = $2 OR user_id2 = $2)",
        )
        .bind(guild_id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.0.unwrap_or(0))
    }
}
