//! Core library for the guild-management bot: voice-channel lifecycle
//! tracking, channel ownership, guild sync, the starboard, and the
//! relationship-affinity engine, all sitting on a two-tier cache-through
//! persistence layer.

pub mod affinity;
pub mod cache;
pub mod config;
pub mod datacache;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod locks;
pub mod ownership;
pub mod remote;
pub mod server;
pub mod starboard;
pub mod sync;
pub mod voice;
pub mod watchdog;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use server::Server;
