//! `MessagingPlatform`: the seam between the worker/listeners and each
//! concrete IRC/Telegram/Discord client (spec.md §4.5.1).

pub mod discord;
pub mod irc;
pub mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::channel_id::ChannelId;
use crate::model::File;

/// Text and attachments ready to send, already formatted by `format.rs`
/// for the destination platform's bold/markup conventions.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub group: ChannelId,
    pub text: String,
    pub files: Vec<File>,
    /// Native id of the message this one replies to on the same peer, if
    /// resolved (spec.md §8 property 4 "reply round-trip").
    pub reply_to_native: Option<String>,
}

/// What a successful send produced, so the worker can append a
/// [`crate::model::BridgeEntry`] (spec.md §4.5 step 3).
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub native_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    /// Short platform name, used in logs and as the `Platform` discriminant.
    fn name(&self) -> &'static str;

    /// Deliver `msg` to its destination group. `Ok(None)` means the
    /// platform sent the message but cannot report a native id (plain IRC);
    /// the caller must not treat that as a failure (spec.md §4.5.1).
    async fn send(&self, msg: &OutgoingMessage) -> anyhow::Result<SentMessage>;

    /// Edit a previously-sent message by native id. Platforms that cannot
    /// edit (IRC) should return `Ok(())` without side effects; the worker
    /// decides whether to call this based on platform capability.
    async fn edit(&self, group: &ChannelId, native_message_id: &str, new_text: &str) -> anyhow::Result<()>;

    /// Delete a previously-sent message by native id.
    async fn delete(&self, group: &ChannelId, native_message_id: &str) -> anyhow::Result<()>;

    /// Whether this platform supports in-place edit/delete of its own
    /// messages (Telegram/Discord: yes; IRC: no, a delete becomes a
    /// notice — spec.md §4.5.1, §6.2).
    fn supports_edit(&self) -> bool;

    /// Fetch remote media referenced by an incoming message to local disk,
    /// returning `File::is_empty() == true` entries for any that failed
    /// (spec.md §7: download failures never abort the relay).
    async fn download_media(&self, refs: &[String]) -> Vec<File>;

    async fn health_check(&self) -> bool;
}
