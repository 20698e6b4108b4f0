//! Stored Record: one per logical cross-platform message (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel_id::ChannelId;

use super::file::File;

/// One leg of a bridged message: the group it was relayed to, and the
/// native message id there (`None` for IRC relays and for peers that
/// failed to send — spec.md §3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeEntry {
    pub group: ChannelId,
    pub message_id: Option<String>,
}

impl BridgeEntry {
    pub fn new(group: ChannelId, message_id: Option<String>) -> Self {
        Self { group, message_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub system: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub from_user_id: String,
    pub from_nick: String,
    pub text: String,
    pub fwd_from: Option<String>,
    /// `_id` of another record, or `None`.
    pub reply_to: Option<i64>,
    pub files: Vec<File>,
    /// `bridge_messages[0]` is always the origin; later entries are relays
    /// in topology (peer-iteration) order.
    pub bridge_messages: Vec<BridgeEntry>,
}

impl StoredRecord {
    pub fn origin(&self) -> Option<&BridgeEntry> {
        self.bridge_messages.first()
    }

    /// `{e.group : e ∈ bridge_messages}` — used by fan-out completeness
    /// checks and by the poller to find which groups a record touches.
    pub fn groups(&self) -> impl Iterator<Item = &ChannelId> {
        self.bridge_messages.iter().map(|e| &e.group)
    }

    pub fn find_entry(&self, group: &ChannelId) -> Option<&BridgeEntry> {
        self.bridge_messages.iter().find(|e| &e.group == group)
    }
}
