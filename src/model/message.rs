//! Canonical Message: the platform-neutral struct produced by listeners and
//! consumed by the worker (spec.md §3, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel_id::ChannelId;

use super::file::File;

/// A reference to a previously-stored record, resolved by the listener at
/// construction time (never traversed by pointer — always looked up by
/// `_id`, per spec.md §9 "cyclic graph of bridged messages").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRef {
    pub record_id: i64,
    /// The replied-to record's bridge entries, copied in at construction
    /// time so the worker can resolve a per-peer reply id without a second
    /// store round-trip (spec.md §4.5 step 3.c).
    pub bridge_messages: Vec<super::record::BridgeEntry>,
    /// Cached text/nick for filter's "filter_reply" check and IRC's
    /// `Re <nick> "text": ` prefix (§6.2), without re-fetching the record.
    pub text: String,
    pub from_nick: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub text: String,
    pub from_user_id: String,
    pub from_nick: String,
    pub from_group: ChannelId,
    pub from_message_id: Option<String>,
    pub platform_prefix: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub fwd_from: Option<String>,
    pub reply_to: Option<ReplyRef>,
    pub files: Vec<File>,
    pub system: bool,
}

/// Attachments are bounded to 10 per message (spec.md §3).
pub const MAX_FILES: usize = 10;

impl CanonicalMessage {
    /// IRC has no native message id and no server-supplied timestamp; the
    /// listener stamps local UTC on receipt (spec.md §4.1 table).
    pub fn from_irc(
        group: ChannelId,
        hostmask: impl Into<String>,
        nick: impl Into<String>,
        text: impl Into<String>,
        platform_prefix: impl Into<String>,
        reply_to: Option<ReplyRef>,
    ) -> Self {
        Self {
            text: text.into(),
            from_user_id: hostmask.into(),
            from_nick: nick.into(),
            from_group: group,
            from_message_id: None,
            platform_prefix: platform_prefix.into(),
            created_at: Utc::now(),
            edited_at: None,
            fwd_from: None,
            reply_to,
            files: Vec::new(),
            system: false,
        }
    }

    /// IRC system events (PART/QUIT/NICK/KICK/KILL) render as inline-coded
    /// text with no platform prefix (spec.md §4.1, §6.2).
    pub fn irc_system_event(
        group: ChannelId,
        hostmask: impl Into<String>,
        nick: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            from_user_id: hostmask.into(),
            from_nick: nick.into(),
            from_group: group,
            from_message_id: None,
            platform_prefix: String::new(),
            created_at: Utc::now(),
            edited_at: None,
            fwd_from: None,
            reply_to: None,
            files: Vec::new(),
            system: true,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_telegram(
        group: ChannelId,
        sender_id: impl Into<String>,
        from_nick: impl Into<String>,
        message_id: i32,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
        platform_prefix: impl Into<String>,
        fwd_from: Option<String>,
        reply_to: Option<ReplyRef>,
        mut files: Vec<File>,
    ) -> Self {
        files.truncate(MAX_FILES);
        Self {
            text: text.into(),
            from_user_id: sender_id.into(),
            from_nick: from_nick.into(),
            from_group: group,
            from_message_id: Some(message_id.to_string()),
            platform_prefix: platform_prefix.into(),
            created_at,
            edited_at: None,
            fwd_from,
            reply_to,
            files,
            system: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_discord(
        group: ChannelId,
        author_id: impl Into<String>,
        from_nick: impl Into<String>,
        message_id: u64,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
        platform_prefix: impl Into<String>,
        fwd_from: Option<String>,
        reply_to: Option<ReplyRef>,
        mut files: Vec<File>,
    ) -> Self {
        files.truncate(MAX_FILES);
        Self {
            text: text.into(),
            from_user_id: author_id.into(),
            from_nick: from_nick.into(),
            from_group: group,
            from_message_id: Some(message_id.to_string()),
            platform_prefix: platform_prefix.into(),
            created_at,
            edited_at: None,
            fwd_from,
            reply_to,
            files,
            system: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_id::Platform;

    #[test]
    fn irc_message_has_no_native_id() {
        let msg = CanonicalMessage::from_irc(
            ChannelId::new(Platform::Irc, "#a"),
            "alice!~a@host",
            "alice",
            "hello",
            "I",
            None,
        );
        assert!(msg.from_message_id.is_none());
        assert!(!msg.system);
    }

    #[test]
    fn telegram_message_truncates_files_to_ten() {
        let files = vec![crate::model::file::File::new(
            crate::model::file::FileKind::Photo,
            "/tmp/a.jpg",
        ); 15];
        let msg = CanonicalMessage::from_telegram(
            ChannelId::new(Platform::Telegram, "100"),
            "1",
            "alice",
            42,
            "hi",
            Utc::now(),
            "T",
            None,
            None,
            files,
        );
        assert_eq!(msg.files.len(), MAX_FILES);
    }

    #[test]
    fn system_event_has_no_platform_prefix() {
        let msg = CanonicalMessage::irc_system_event(
            ChannelId::new(Platform::Irc, "#a"),
            "bob!~b@host",
            "bob",
            "bob has quit",
        );
        assert!(msg.system);
        assert!(msg.platform_prefix.is_empty());
    }
}
