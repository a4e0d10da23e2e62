//! Cache key layout (§6 "Cache key layout").
//!
//! Centralized so a key's shape and its TTL are defined exactly once, next to
//! each other, instead of scattered across call sites.

pub const DEFAULT_TTL: u64 = 3600;
pub const CALL_STATE_TTL: u64 = 1800;
pub const COUP_SESSION_TTL: u64 = 300;
pub const RATE_LIMIT_TTL: u64 = 60;

pub fn channel_owner(channel_id: &str) -> String {
    format!("channel_owner:{channel_id}")
}

pub fn active_voice(user_id: &str) -> String {
    format!("active_voice:{user_id}")
}

pub fn channel_members(channel_id: &str) -> String {
    format!("channel_members:{channel_id}")
}

pub fn user_prefs(user_id: &str, guild_id: &str) -> String {
    format!("user_prefs:{user_id}:{guild_id}")
}

pub fn guild_config(guild_id: &str) -> String {
    format!("guild_config:{guild_id}")
}

pub fn call_state(channel_id: &str) -> String {
    format!("call_state:{channel_id}")
}

pub fn coup_session(channel_id: &str) -> String {
    format!("coup_session:{channel_id}")
}

pub fn rate_limit(user_id: &str, action: &str) -> String {
    format!("rate_limit:{user_id}:{action}")
}

pub fn starboard_entry(guild_id: &str, message_id: &str) -> String {
    format!("starboard_entry:{guild_id}:{message_id}")
}

pub fn user_role_data(user_id: &str, guild_id: &str) -> String {
    format!("user_role_data:{user_id}:{guild_id}")
}
