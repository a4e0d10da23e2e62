//! Relationship Affinity Engine (§4.I): pair-wise interaction scoring derived
//! from message co-occurrence, mentions, and replies, producing a bounded
//! per-user network.
//!
//! Reads are cache-through against the member row itself: [`Store::get_relationships`]
//! holds both the last-computed ranking and the timestamp it was computed at,
//! so a fresh read skips recomputation entirely (§4.I "Reads are cache-through").

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Store;
use crate::error::CoreResult;

const TOP_N: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    SameChannel,
    Mention,
    Reply,
}

/// Per-kind point values. The spec requires the computation accept an
/// injected table rather than hardcoding weights (§4.I).
#[derive(Debug, Clone, Copy)]
pub struct InteractionWeights {
    pub same_channel: i32,
    pub mention: i32,
    pub reply: i32,
}

impl Default for InteractionWeights {
    fn default() -> Self {
        Self { same_channel: 1, mention: 3, reply: 5 }
    }
}

impl InteractionWeights {
    fn weight(&self, kind: InteractionKind) -> i32 {
        match kind {
            InteractionKind::SameChannel => self.same_channel,
            InteractionKind::Mention => self.mention,
            InteractionKind::Reply => self.reply,
        }
    }
}

/// Percentage is the default per §4.I; the logarithmic form is an older
/// variant that must remain selectable behind this policy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    #[default]
    Percentage,
    Logarithmic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityEntry {
    pub user_id: String,
    pub affinity_percentage: f64,
    pub log_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRanking {
    computed_at: DateTime<Utc>,
    entries: Vec<AffinityEntry>,
}

pub struct AffinityEngine {
    store: Store,
    window: ChronoDuration,
    weights: InteractionWeights,
    normalization: Normalization,
    cache_ttl: ChronoDuration,
}

impl AffinityEngine {
    pub fn new(
        store: Store,
        window: ChronoDuration,
        weights: InteractionWeights,
        normalization: Normalization,
        cache_ttl_minutes: i64,
    ) -> Self {
        Self { store, window, weights, normalization, cache_ttl: ChronoDuration::minutes(cache_ttl_minutes) }
    }

    /// Records the interaction weight a newly-observed message contributes:
    /// same-channel co-presence with everyone else who posted in the rolling
    /// window, a mention bump toward each mentioned user, and a reply bump
    /// toward the parent message's author.
    pub async fn process_message(
        &self,
        guild_id: &str,
        author_id: &str,
        channel_id: &str,
        mentions: &[String],
        reply_to_author: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let window_start = at - self.window;
        let recent = self.store.messages_since(guild_id, window_start).await?;

        let mut co_present = HashSet::new();
        for message in recent.iter().filter(|m| m.channel_id == channel_id && m.author_id != author_id) {
            co_present.insert(message.author_id.clone());
        }
        for other in &co_present {
            self.bump(guild_id, author_id, other, InteractionKind::SameChannel, at).await?;
        }
        for mentioned in mentions {
            if mentioned != author_id {
                self.bump(guild_id, author_id, mentioned, InteractionKind::Mention, at).await?;
            }
        }
        if let Some(parent_author) = reply_to_author {
            if parent_author != author_id {
                self.bump(guild_id, author_id, parent_author, InteractionKind::Reply, at).await?;
            }
        }
        Ok(())
    }

    async fn bump(
        &self,
        guild_id: &str,
        user_a: &str,
        user_b: &str,
        kind: InteractionKind,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let weight = self.weights.weight(kind);
        self.store.bump_interaction(guild_id, user_a, user_b, weight, at).await?;
        Ok(())
    }

    /// Cache-through read of `user_id`'s affinity ranking: serves the stored
    /// list if it was computed within `cacheTTLMinutes`, else recomputes and
    /// overwrites it.
    pub async fn get_ranking(&self, guild_id: &str, user_id: &str) -> CoreResult<Vec<AffinityEntry>> {
        if let Some(stored) = self.store.get_relationships(guild_id, user_id).await? {
            if let Ok(ranking) = serde_json::from_value::<StoredRanking>(stored) {
                if Utc::now() - ranking.computed_at < self.cache_ttl {
                    return Ok(ranking.entries);
                }
            }
        }
        self.recompute(guild_id, user_id).await
    }

    /// Recomputes and persists `user_id`'s ranking, ignoring whatever was
    /// cached.
    pub async fn recompute(&self, guild_id: &str, user_id: &str) -> CoreResult<Vec<AffinityEntry>> {
        let rows = self.store.relationships_for_user(guild_id, user_id).await?;
        let total: i64 = rows.iter().map(|r| r.interaction_count as i64).sum();

        let mut entries: Vec<AffinityEntry> = rows
            .iter()
            .map(|row| {
                let other = if row.user_id1 == user_id { &row.user_id2 } else { &row.user_id1 };
                let raw = row.interaction_count as f64;
                let percentage = if total == 0 { 0.0 } else { 100.0 * raw / total as f64 };
                let log_score = (25.0 * (raw + 1.0).log10()).min(100.0);
                AffinityEntry { user_id: other.clone(), affinity_percentage: percentage, log_score }
            })
            .collect();

        match self.normalization {
            Normalization::Percentage => {
                entries.sort_by(|a, b| b.affinity_percentage.partial_cmp(&a.affinity_percentage).unwrap());
            }
            Normalization::Logarithmic => {
                entries.sort_by(|a, b| b.log_score.partial_cmp(&a.log_score).unwrap());
            }
        }
        entries.truncate(TOP_N);

        let ranking = StoredRanking { computed_at: Utc::now(), entries: entries.clone() };
        let encoded = serde_json::to_value(&ranking).expect("StoredRanking always serializes");
        self.store.set_relationships(guild_id, user_id, &encoded).await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_sum_to_100_within_rounding() {
        let rows_interaction_counts = [7, 3];
        let total: i64 = rows_interaction_counts.iter().sum();
        let percentages: Vec<f64> =
            rows_interaction_counts.iter().map(|c| 100.0 * (*c as f64) / total as f64).collect();
        let sum: f64 = percentages.iter().sum();
        assert!((sum - 100.0).abs() < 0.01);
    }

    #[test]
    fn zero_total_yields_zero_percentage() {
        let total: i64 = 0;
        let percentage = if total == 0 { 0.0 } else { 100.0 };
        assert_eq!(percentage, 0.0);
    }

    #[test]
    fn log_score_is_capped_at_100() {
        let log_score = (25.0 * (10_000_000.0_f64 + 1.0).log10()).min(100.0);
        assert!(log_score <= 100.0);
    }
}
