//! Process configuration.
//!
//! Every flag has a matching environment variable so the bot can be configured
//! purely from the environment in container deployments. Missing required
//! values cause [`Config::validate`] to refuse to start rather than limp along
//! with half-initialized state.

use clap::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

/// Which affinity-score normalisation (§4.I) callers see by default.
/// Percentage is authoritative per the spec; logarithmic is the older
/// variant kept selectable rather than deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AffinityNormalization {
    Percentage,
    Logarithmic,
}

impl Default for AffinityNormalization {
    fn default() -> Self {
        AffinityNormalization::Percentage
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "guildwarden", about = "Voice, starboard, and sync core for a Discord guild bot")]
pub struct Config {
    /// Discord bot token. Required.
    #[arg(long, env = "DISCORD_BOT_TOKEN")]
    pub bot_token: String,

    /// Guild this bot is scoped to. Voice tracking and sync are no-ops for any other guild.
    #[arg(long, env = "DISCORD_GUILD_ID")]
    pub guild_id: u64,

    /// Template channel whose JOIN events spawn a new owned voice channel.
    #[arg(long, env = "SPAWN_CHANNEL_ID")]
    pub spawn_channel_id: Option<u64>,

    /// Channel starred messages are promoted into.
    #[arg(long, env = "STARBOARD_CHANNEL_ID")]
    pub starboard_channel_id: Option<u64>,

    /// Postgres connection string for the persistent store.
    #[arg(long, env = "PRIMARY_STORE_URL")]
    pub primary_store_url: String,

    /// Redis connection string for the hot cache.
    #[arg(long, env = "CACHE_URL")]
    pub cache_url: String,

    #[arg(long, env = "ENVIRONMENT", value_enum, default_value = "development")]
    pub environment: Environment,

    /// Port for the liveness/readiness HTTP surface.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Star-reaction threshold for starboard promotion.
    #[arg(long, env = "STARBOARD_THRESHOLD", default_value_t = 3)]
    pub starboard_threshold: i32,

    /// Minutes between starboard reconciliation sweeps.
    #[arg(long, env = "STARBOARD_RECONCILE_MINUTES", default_value_t = 30)]
    pub starboard_reconcile_minutes: u64,

    /// Optional LLM integration key (consumed by collaborators outside this core).
    #[arg(long, env = "LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// Optional image-generation integration key (consumed by collaborators outside this core).
    #[arg(long, env = "IMAGE_GEN_API_KEY")]
    pub image_gen_api_key: Option<String>,

    /// Rolling window, in seconds, the affinity engine looks back across for
    /// same-channel co-presence when scoring a new message.
    #[arg(long, env = "RELATIONSHIP_WINDOW_SECONDS", default_value_t = 300)]
    pub relationship_window_seconds: i64,

    /// Minutes a computed affinity ranking is served from cache before being
    /// recomputed on next read.
    #[arg(long, env = "RELATIONSHIP_CACHE_TTL_MINUTES", default_value_t = 60)]
    pub relationship_cache_ttl_minutes: i64,

    #[arg(long, env = "RELATIONSHIP_WEIGHT_SAME_CHANNEL", default_value_t = 1)]
    pub relationship_weight_same_channel: i32,

    #[arg(long, env = "RELATIONSHIP_WEIGHT_MENTION", default_value_t = 3)]
    pub relationship_weight_mention: i32,

    #[arg(long, env = "RELATIONSHIP_WEIGHT_REPLY", default_value_t = 5)]
    pub relationship_weight_reply: i32,

    #[arg(long, env = "RELATIONSHIP_NORMALIZATION", value_enum, default_value = "percentage")]
    pub relationship_normalization: AffinityNormalization,
}

impl Config {
    /// Parse from CLI args/env and validate. Returns a human-readable error instead
    /// of panicking so `main` can log-and-exit(1) cleanly.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("DISCORD_BOT_TOKEN is required");
        }
        if self.guild_id == 0 {
            anyhow::bail!("DISCORD_GUILD_ID is required");
        }
        if self.primary_store_url.trim().is_empty() {
            anyhow::bail!("PRIMARY_STORE_URL is required");
        }
        if self.cache_url.trim().is_empty() {
            anyhow::bail!("CACHE_URL is required");
        }
        Ok(())
    }

    pub fn json_logs(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}
