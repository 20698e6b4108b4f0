//! Telegram delete poller (spec.md §4.6). The Bot/MTProto update stream
//! never tells us a message was deleted *by another client* outside our
//! session's view in every case, so the bridge periodically re-fetches
//! recently-bridged Telegram messages and treats a missing slot as a
//! delete that was never reported.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::channel_id::ChannelId;
use crate::platform::telegram::TelegramPlatform;
use crate::queue::{InternalTask, QueueItem};
use crate::store::MessageStore;
use crate::worker;

const SLEEP_INIT: Duration = Duration::from_secs(30);
const LOOP_DELAY: Duration = Duration::from_secs(3);
const POLL_WINDOW: usize = 500;

/// Runs forever; spawn onto its own task. `groups` is every bridged
/// Telegram channel (spec.md §4.6 "for each telegram group").
pub async fn run(
    telegram: Arc<TelegramPlatform>,
    store: Arc<MessageStore>,
    tx: UnboundedSender<QueueItem>,
    groups: Vec<ChannelId>,
) {
    tokio::time::sleep(SLEEP_INIT).await;

    loop {
        for group in &groups {
            if let Err(err) = poll_group(&telegram, &store, &tx, group).await {
                tracing::warn!(group = %group, error = %err, "telegram delete poll failed");
            }
            tokio::time::sleep(LOOP_DELAY).await;
        }
    }
}

async fn poll_group(
    telegram: &TelegramPlatform,
    store: &MessageStore,
    tx: &UnboundedSender<QueueItem>,
    group: &ChannelId,
) -> anyhow::Result<()> {
    let records = store.recent_records_with_group(group, POLL_WINDOW)?;
    if records.is_empty() {
        return Ok(());
    }

    let mut ids = Vec::with_capacity(records.len());
    for record in &records {
        let Some(entry) = record.find_entry(group) else { continue };
        let Some(message_id) = &entry.message_id else { continue };
        if let Ok(id) = message_id.parse::<i32>() {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        return Ok(());
    }

    let peer = telegram.resolve(group).await?;
    let fetched = match telegram.client().get_messages_by_id(peer, &ids).await {
        Ok(fetched) => fetched,
        Err(err) => {
            if let Some(wait) = flood_wait_seconds(&err) {
                tracing::warn!(seconds = wait, "telegram flood wait during delete poll");
                tokio::time::sleep(Duration::from_secs(wait)).await;
            }
            return Err(anyhow::anyhow!("get_messages_by_id failed: {err}"));
        }
    };

    let mut deletions = Vec::new();
    for (record, slot) in records.iter().zip(fetched.iter()) {
        if slot.is_some() {
            continue;
        }
        if let Some(pair) = worker::delete_pair_for(record, group) {
            deletions.push(pair);
        }
    }

    if !deletions.is_empty() {
        let _ = tx.send(QueueItem::Internal(InternalTask::Delete { deletions }));
    }

    Ok(())
}

fn flood_wait_seconds(err: &grammers_client::client::messages::InvocationError) -> Option<u64> {
    match err {
        grammers_client::client::messages::InvocationError::Rpc(rpc) if rpc.is("FLOOD_WAIT*") => {
            rpc.value.map(u64::from)
        }
        _ => None,
    }
}
