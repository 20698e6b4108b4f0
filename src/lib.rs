//! Relay engine for a multi-platform IRC/Telegram/Discord chat bridge.
//!
//! See `config` for the TOML schema, `worker` for the single-consumer fan-out
//! loop, and `platform` for the per-network clients.

pub mod channel_id;
pub mod commands;
pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod model;
pub mod platform;
pub mod poller;
pub mod queue;
pub mod store;
pub mod topology;
pub mod worker;
