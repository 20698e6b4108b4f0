//! Event Queue: the single FIFO between listeners and the worker (spec.md
//! §3, §4.4). Two kinds of items share one queue so ordering between a
//! forwarded message and a later edit/delete of it is preserved.

use tokio::sync::mpsc;

use crate::channel_id::ChannelId;
use crate::model::CanonicalMessage;

#[derive(Debug, Clone)]
pub enum InternalTask {
    /// A platform reported one of its own messages edited.
    Edit {
        group: ChannelId,
        native_message_id: String,
        new_text: String,
    },
    /// A platform reported one or more of its own messages deleted, all as
    /// part of the same underlying event (a bulk-delete callback, or one
    /// delete-poller pass over a group). Each pair is `(origin_group,
    /// native_message_id)`. Batching here, rather than one task per
    /// message, is what lets IRC peers receive a single de-duplicated
    /// "was/were deleted" notice per batch instead of one per message
    /// (spec.md §4.5, §6.2).
    Delete { deletions: Vec<(ChannelId, String)> },
    /// `ircnames [target]` — `requester` is the Channel ID to reply on.
    IrcNames { requester: ChannelId, target: Option<String> },
    /// `ircwhois <target>`. The Worker performs the RPC and replies; this
    /// variant is the request, not the result (spec.md §4.5 "Command
    /// tasks", §6.4).
    IrcWhois { requester: ChannelId, nick: String },
    /// `ircwhowas <target>`.
    IrcWhowas { requester: ChannelId, nick: String },
}

#[derive(Debug, Clone)]
pub enum QueueItem {
    Forward(CanonicalMessage),
    Internal(InternalTask),
}

/// Unbounded per spec.md §4.4's reference design: listeners must never block
/// on enqueue, and the worker is the sole consumer so there is no fan-out to
/// bound against.
pub fn channel() -> (mpsc::UnboundedSender<QueueItem>, mpsc::UnboundedReceiver<QueueItem>) {
    mpsc::unbounded_channel()
}
