//! The Worker: sole consumer of the event queue (spec.md §4.5).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::channel_id::{ChannelId, Platform};
use crate::filter::Filter;
use crate::format;
use crate::model::{BridgeEntry, CanonicalMessage, StoredRecord};
use crate::platform::irc::IrcPlatform;
use crate::platform::{MessagingPlatform, OutgoingMessage};
use crate::queue::{InternalTask, QueueItem};
use crate::store::{self, MessageStore};
use crate::topology::Topology;

pub struct Worker {
    topology: Arc<Topology>,
    store: Arc<MessageStore>,
    filter: Arc<Filter>,
    platforms: HashMap<Platform, Arc<dyn MessagingPlatform>>,
    /// `commands.rs` needs WHOIS/WHOWAS/NAMES, which aren't part of the
    /// generic `MessagingPlatform` seam (spec.md §6.4).
    irc_commands: Option<Arc<IrcPlatform>>,
}

impl Worker {
    pub fn new(
        topology: Arc<Topology>,
        store: Arc<MessageStore>,
        filter: Arc<Filter>,
        platforms: HashMap<Platform, Arc<dyn MessagingPlatform>>,
        irc_commands: Option<Arc<IrcPlatform>>,
    ) -> Self {
        Self { topology, store, filter, platforms, irc_commands }
    }

    pub async fn run(self, mut rx: UnboundedReceiver<QueueItem>) {
        while let Some(item) = rx.recv().await {
            match item {
                QueueItem::Forward(msg) => self.handle_forward(msg).await,
                QueueItem::Internal(task) => self.handle_internal(task).await,
            }
        }
        tracing::warn!("event queue closed, worker loop exiting");
    }

    fn platform_for(&self, group: &ChannelId) -> Option<&Arc<dyn MessagingPlatform>> {
        self.platforms.get(&group.platform())
    }

    /// Forward message (spec.md §4.5 "Forward message" steps 1-4).
    async fn handle_forward(&self, msg: CanonicalMessage) {
        let targets = self.topology.peers(&msg.from_group).to_vec();
        let mut bridge_messages = vec![BridgeEntry::new(msg.from_group.clone(), msg.from_message_id.clone())];

        let is_spam = if msg.from_group.platform() == Platform::Telegram && !msg.system {
            self.filter
                .is_spam(
                    msg.from_group.native_id(),
                    msg.from_message_id.as_deref().unwrap_or_default(),
                    &msg.from_user_id,
                )
                .await
        } else {
            false
        };

        // Per-peer fan-out is strictly sequential (spec.md §5: "the Worker
        // does not interleave peers"), so bridge_messages preserves peer
        // iteration order.
        for target in &targets {
            if is_spam || self.filter.blocks_by_rule(&msg, target) {
                continue;
            }

            let Some(platform) = self.platform_for(target) else {
                tracing::warn!(peer = %target, "unknown platform for bridge peer, skipping");
                bridge_messages.push(BridgeEntry::new(target.clone(), None));
                continue;
            };

            let reply_to_native = msg
                .reply_to
                .as_ref()
                .and_then(|r| r.bridge_messages.iter().find(|e| &e.group == target))
                .and_then(|e| e.message_id.clone());

            let relay_text = format::format_for_platform(&msg, target.platform());
            let outgoing = OutgoingMessage {
                group: target.clone(),
                text: relay_text,
                files: msg.files.clone(),
                reply_to_native,
            };

            match platform.send(&outgoing).await {
                Ok(sent) => bridge_messages.push(BridgeEntry::new(target.clone(), sent.native_message_id)),
                Err(err) => {
                    tracing::warn!(peer = %target, error = %err, "peer send failed, continuing fan-out");
                    bridge_messages.push(BridgeEntry::new(target.clone(), None));
                }
            }
        }

        let mut record = store::record_from_canonical(&msg, msg.reply_to.as_ref().map(|r| r.record_id));
        record.bridge_messages = bridge_messages;
        if let Err(err) = self.store.insert(&record) {
            tracing::error!(error = %err, "failed to persist bridged record");
        }
    }

    async fn handle_internal(&self, task: InternalTask) {
        match task {
            InternalTask::Delete { deletions } => {
                self.handle_delete(&deletions).await;
            }
            InternalTask::Edit { group, native_message_id, new_text } => {
                self.handle_edit(&group, &native_message_id, &new_text).await;
            }
            InternalTask::IrcNames { .. } | InternalTask::IrcWhois { .. } | InternalTask::IrcWhowas { .. } => {
                crate::commands::dispatch(self.irc_commands.as_deref(), &self.platforms, &self.topology, task).await;
            }
        }
    }

    /// Internal delete (spec.md §4.5 "Internal delete"). `deletions` is
    /// every message reported deleted by the same underlying event; each
    /// record is marked deleted and fanned out independently, but IRC
    /// peers are notified at most once per group for the whole batch
    /// (spec.md §6.2's "[and K more messages]" / was-vs-were wording),
    /// matching the original bridge's per-batch `irc_groups_notified` set.
    /// A record already marked deleted is a no-op, which is what makes
    /// re-delivery of the same (group, message_id) idempotent (spec.md §8
    /// property 3).
    async fn handle_delete(&self, deletions: &[(ChannelId, String)]) {
        let mut records = Vec::with_capacity(deletions.len());
        for (group, native_message_id) in deletions {
            let record = match self.store.find_by_member(group, native_message_id) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(error = %err, "store lookup failed during delete");
                    continue;
                }
            };
            if record.deleted {
                continue;
            }
            if let Err(err) = self.store.mark_deleted(record.id, Utc::now()) {
                tracing::error!(error = %err, "failed to mark record deleted");
                continue;
            }
            records.push((group.clone(), record));
        }

        if records.is_empty() {
            return;
        }

        let extra_count = records.len() - 1;
        let notice_text = records[0].1.text.clone();
        let mut irc_notified: HashSet<ChannelId> = HashSet::new();

        for (origin_group, record) in &records {
            let targets = match self.store.find_and_filter_for_update(&self.topology, record.id, origin_group) {
                Ok(targets) => targets,
                Err(err) => {
                    tracing::error!(error = %err, "failed to resolve update targets during delete");
                    continue;
                }
            };
            for entry in &targets {
                let Some(message_id) = &entry.message_id else { continue };
                let Some(platform) = self.platform_for(&entry.group) else { continue };

                if entry.group.platform() == Platform::Irc {
                    if irc_notified.insert(entry.group.clone()) {
                        let notice = format::irc_delete_notice(&notice_text, extra_count);
                        let _ = platform
                            .send(&OutgoingMessage {
                                group: entry.group.clone(),
                                text: notice,
                                files: Vec::new(),
                                reply_to_native: None,
                            })
                            .await;
                    }
                    continue;
                }

                if let Err(err) = platform.delete(&entry.group, message_id).await {
                    tracing::warn!(peer = %entry.group, error = %err, "delete propagation failed");
                }
            }
        }
    }

    /// Internal edit (spec.md §4.5 "Internal edit"). Telegram album edits
    /// are applied only to the first relayed message per peer group, which
    /// is exactly what `update_targets` + single-entry-per-group already
    /// gives us since each peer appears at most once in `bridge_messages`.
    async fn handle_edit(&self, group: &ChannelId, native_message_id: &str, new_text: &str) {
        let record = match self.store.find_by_member(group, native_message_id) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(error = %err, "store lookup failed during edit");
                return;
            }
        };

        if record.deleted {
            return;
        }

        let old_text = record.text.clone();
        if let Err(err) = self.store.mark_edited(record.id, new_text, Utc::now()) {
            tracing::error!(error = %err, "failed to mark record edited");
            return;
        }

        let targets = match self.store.find_and_filter_for_update(&self.topology, record.id, group) {
            Ok(targets) => targets,
            Err(err) => {
                tracing::error!(error = %err, "failed to resolve update targets during edit");
                return;
            }
        };
        for entry in &targets {
            let Some(message_id) = &entry.message_id else { continue };
            let Some(platform) = self.platform_for(&entry.group) else { continue };

            if platform.supports_edit() {
                if let Err(err) = platform.edit(&entry.group, message_id, new_text).await {
                    tracing::warn!(peer = %entry.group, error = %err, "edit propagation failed");
                }
            } else {
                let notice = format::irc_edit_notice(&old_text, new_text);
                let _ = platform
                    .send(&OutgoingMessage {
                        group: entry.group.clone(),
                        text: notice,
                        files: Vec::new(),
                        reply_to_native: None,
                    })
                    .await;
            }
        }
    }
}

/// Helper for the delete poller (spec.md §4.6 step 4): the `(group,
/// native_message_id)` pair for a record whose Telegram leg has gone
/// missing, to be collected into a single batched `InternalTask::Delete`
/// for the group's poll pass.
pub fn delete_pair_for(record: &StoredRecord, origin_group: &ChannelId) -> Option<(ChannelId, String)> {
    let entry = record.find_entry(origin_group)?;
    let message_id = entry.message_id.clone()?;
    Some((origin_group.clone(), message_id))
}

/// End-to-end scenarios S1-S6 and properties 1-6 (spec.md §8), driven
/// through the public `Worker`/`MessageStore`/`Topology` API with fake
/// `MessagingPlatform`s standing in for the network clients.
#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::config::{FilterConfig, FilterRule, SpamCheckConfig};
    use crate::model::File;
    use crate::platform::SentMessage;
    use crate::queue::{self, QueueItem};

    use super::*;

    #[derive(Default)]
    struct FakeState {
        sent: Vec<(ChannelId, String, Option<String>)>,
        edits: Vec<(ChannelId, String, String)>,
        deletes: Vec<(ChannelId, String)>,
    }

    struct FakePlatform {
        name: &'static str,
        state: Arc<StdMutex<FakeState>>,
        supports_edit: bool,
        /// Channels this fake refuses to send to, simulating S5's "channel missing".
        unreachable: Vec<ChannelId>,
        next_id: StdMutex<u64>,
    }

    impl FakePlatform {
        fn new(name: &'static str, supports_edit: bool) -> (Arc<Self>, Arc<StdMutex<FakeState>>) {
            let state = Arc::new(StdMutex::new(FakeState::default()));
            (
                Arc::new(Self {
                    name,
                    state: state.clone(),
                    supports_edit,
                    unreachable: Vec::new(),
                    next_id: StdMutex::new(1),
                }),
                state,
            )
        }

        fn with_unreachable(
            name: &'static str,
            supports_edit: bool,
            unreachable: Vec<ChannelId>,
        ) -> (Arc<Self>, Arc<StdMutex<FakeState>>) {
            let state = Arc::new(StdMutex::new(FakeState::default()));
            (
                Arc::new(Self {
                    name,
                    state: state.clone(),
                    supports_edit,
                    unreachable,
                    next_id: StdMutex::new(1),
                }),
                state,
            )
        }
    }

    #[async_trait]
    impl MessagingPlatform for FakePlatform {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, msg: &OutgoingMessage) -> anyhow::Result<SentMessage> {
            if self.unreachable.contains(&msg.group) {
                anyhow::bail!("channel {} is not reachable", msg.group);
            }
            let mut id_guard = self.next_id.lock().unwrap();
            let id = *id_guard;
            *id_guard += 1;
            self.state
                .lock()
                .unwrap()
                .sent
                .push((msg.group.clone(), msg.text.clone(), msg.reply_to_native.clone()));
            Ok(SentMessage {
                native_message_id: Some(id.to_string()),
                sent_at: Utc::now(),
            })
        }

        async fn edit(&self, group: &ChannelId, native_message_id: &str, new_text: &str) -> anyhow::Result<()> {
            self.state
                .lock()
                .unwrap()
                .edits
                .push((group.clone(), native_message_id.to_string(), new_text.to_string()));
            Ok(())
        }

        async fn delete(&self, group: &ChannelId, native_message_id: &str) -> anyhow::Result<()> {
            self.state.lock().unwrap().deletes.push((group.clone(), native_message_id.to_string()));
            Ok(())
        }

        fn supports_edit(&self) -> bool {
            self.supports_edit
        }

        async fn download_media(&self, _refs: &[String]) -> Vec<File> {
            Vec::new()
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn irc(id: &str) -> ChannelId {
        ChannelId::new(Platform::Irc, id)
    }
    fn tg(id: &str) -> ChannelId {
        ChannelId::new(Platform::Telegram, id)
    }
    fn discord(id: &str) -> ChannelId {
        ChannelId::new(Platform::Discord, id)
    }

    async fn run_and_drain(worker: Worker, items: Vec<QueueItem>) {
        let (tx, rx) = queue::channel();
        let handle = tokio::spawn(worker.run(rx));
        for item in items {
            tx.send(item).unwrap();
        }
        // Dropping the sender closes the channel, ending the worker's loop.
        drop(tx);
        handle.await.unwrap();
    }

    fn empty_filter() -> Arc<Filter> {
        Arc::new(Filter::compile(&FilterConfig::default(), SpamCheckConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn s1_simple_relay() {
        let topology = Arc::new(Topology::from_groups(&[vec![irc("#a"), tg("100")]]));
        let store = Arc::new(MessageStore::open_in_memory().unwrap());
        let (telegram, telegram_state) = FakePlatform::new("telegram", true);

        let mut platforms: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        platforms.insert(Platform::Telegram, telegram);

        let worker = Worker::new(topology, store.clone(), empty_filter(), platforms, None);

        let msg = CanonicalMessage::from_irc(irc("#a"), "alice!~a@host", "alice", "hello", "I", None);
        run_and_drain(worker, vec![QueueItem::Forward(msg)]).await;

        let sent = telegram_state.lock().unwrap();
        assert_eq!(sent.sent.len(), 1);
        assert_eq!(sent.sent[0].0, tg("100"));
        assert_eq!(sent.sent[0].1, "[I - **alice**] hello");

        let record = store.get(1).unwrap().unwrap();
        assert_eq!(record.bridge_messages[0].group, irc("#a"));
        assert_eq!(record.bridge_messages[0].message_id, None);
        assert_eq!(record.bridge_messages[1].group, tg("100"));
        assert_eq!(record.bridge_messages[1].message_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn s2_chain_is_directed_and_outbound_only() {
        // [[A,C],[C,D]]
        let a = irc("a");
        let c = irc("c");
        let d = irc("d");
        let topology = Arc::new(Topology::from_groups(&[vec![a.clone(), c.clone()], vec![c.clone(), d.clone()]]));
        let store = Arc::new(MessageStore::open_in_memory().unwrap());

        // A single IRC platform instance in production serves every IRC
        // channel; separate fakes per run here just isolate the two calls'
        // recorded sends from each other.
        let (platform_c, state_c) = FakePlatform::new("irc", false);
        let mut platforms: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        platforms.insert(Platform::Irc, platform_c);

        let worker = Worker::new(topology.clone(), store.clone(), empty_filter(), platforms, None);
        let from_a = CanonicalMessage::from_irc(a.clone(), "alice!~a@host", "alice", "first", "I", None);
        run_and_drain(worker, vec![QueueItem::Forward(from_a)]).await;

        // A's message reached C only.
        assert_eq!(state_c.lock().unwrap().sent.len(), 1);
        assert_eq!(state_c.lock().unwrap().sent[0].0, c);

        let mut platforms2: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        let (platform_d2, state_d2) = FakePlatform::new("irc", false);
        platforms2.insert(Platform::Irc, platform_d2);
        let worker2 = Worker::new(topology, store.clone(), empty_filter(), platforms2, None);
        let from_c = CanonicalMessage::from_irc(c.clone(), "bob!~b@host", "bob", "second", "I", None);
        run_and_drain(worker2, vec![QueueItem::Forward(from_c)]).await;

        // C's message fans out to D only, never bounces back to A.
        let sent_d = state_d2.lock().unwrap();
        assert_eq!(sent_d.len(), 1);
        assert_eq!(sent_d[0].0, d);

        // Two records exist.
        assert!(store.get(1).unwrap().is_some());
        assert!(store.get(2).unwrap().is_some());
    }

    #[tokio::test]
    async fn s3_edit_propagates_outbound_only() {
        // A (telegram, has a real native id to key the edit off) -> C (discord)
        // -> D (discord). Editing the message at its origin A must reach C
        // (A's only peer) and never touch D, which A's record never bridged.
        let a = tg("a");
        let c = discord("c");
        let d = discord("d");
        let topology = Arc::new(Topology::from_groups(&[vec![a.clone(), c.clone()], vec![c.clone(), d.clone()]]));
        let store = Arc::new(MessageStore::open_in_memory().unwrap());

        let (telegram, _telegram_state) = FakePlatform::new("telegram", true);
        let (disc, disc_state) = FakePlatform::new("discord", true);
        let mut platforms: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        platforms.insert(Platform::Telegram, telegram);
        platforms.insert(Platform::Discord, disc.clone());

        let worker = Worker::new(topology.clone(), store.clone(), empty_filter(), platforms, None);

        let original = CanonicalMessage::from_telegram(
            a.clone(),
            "u1",
            "alice",
            10,
            "first",
            chrono::Utc::now(),
            "T",
            None,
            None,
            Vec::new(),
        );
        run_and_drain(worker, vec![QueueItem::Forward(original)]).await;

        let record = store.get(1).unwrap().unwrap();
        assert_eq!(record.bridge_messages[0].group, a);
        assert_eq!(record.find_entry(&c).unwrap().group, c);
        // D never received anything from this record.
        assert!(record.find_entry(&d).is_none());

        let (telegram2, _telegram_state2) = FakePlatform::new("telegram", true);
        let mut platforms2: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        platforms2.insert(Platform::Telegram, telegram2);
        platforms2.insert(Platform::Discord, disc);
        let worker2 = Worker::new(topology, store.clone(), empty_filter(), platforms2, None);

        let edit = InternalTask::Edit {
            group: a,
            native_message_id: "10".to_string(),
            new_text: "first (edited)".to_string(),
        };
        run_and_drain(worker2, vec![QueueItem::Internal(edit)]).await;

        // The edit reaches C (A's only peer); D is untouched.
        assert_eq!(disc_state.lock().unwrap().edits.len(), 1);
        assert_eq!(disc_state.lock().unwrap().edits[0].0, c);
    }

    #[tokio::test]
    async fn s4_delete_reconciliation_is_idempotent() {
        let telegram_group = tg("100");
        let discord_group = discord("200");
        let topology = Arc::new(Topology::from_groups(&[vec![telegram_group.clone(), discord_group.clone()]]));
        let store = Arc::new(MessageStore::open_in_memory().unwrap());

        let (telegram, _telegram_state) = FakePlatform::new("telegram", true);
        let (disc, disc_state) = FakePlatform::new("discord", true);
        let mut platforms: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        platforms.insert(Platform::Telegram, telegram);
        platforms.insert(Platform::Discord, disc);

        let worker = Worker::new(topology, store.clone(), empty_filter(), platforms, None);

        let original = CanonicalMessage::from_telegram(
            telegram_group.clone(),
            "u1",
            "alice",
            42,
            "hello",
            chrono::Utc::now(),
            "T",
            None,
            None,
            Vec::new(),
        );

        let delete_task = InternalTask::Delete {
            deletions: vec![(telegram_group.clone(), "42".to_string())],
        };
        run_and_drain(
            worker,
            vec![QueueItem::Forward(original), QueueItem::Internal(delete_task.clone())],
        )
        .await;

        assert_eq!(disc_state.lock().unwrap().deletes.len(), 1);
        let record = store.get(1).unwrap().unwrap();
        assert!(record.deleted);

        // Second application is a no-op: no additional delete RPC.
        let (telegram2, _telegram_state2) = FakePlatform::new("telegram", true);
        let (disc2, disc_state2) = FakePlatform::new("discord", true);
        let mut platforms2: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        platforms2.insert(Platform::Telegram, telegram2);
        platforms2.insert(Platform::Discord, disc2);
        let worker2 = Worker::new(
            Arc::new(Topology::from_groups(&[vec![telegram_group.clone(), discord_group.clone()]])),
            store.clone(),
            empty_filter(),
            platforms2,
            None,
        );
        run_and_drain(worker2, vec![QueueItem::Internal(delete_task)]).await;
        assert!(disc_state2.lock().unwrap().deletes.is_empty());
    }

    #[tokio::test]
    async fn s5_partial_fan_out_failure_still_persists_record() {
        let a = irc("a");
        let tgc = tg("100");
        let dc = discord("200");
        let topology = Arc::new(Topology::from_groups(&[vec![a.clone(), tgc.clone(), dc.clone()]]));
        let store = Arc::new(MessageStore::open_in_memory().unwrap());

        let (telegram, telegram_state) = FakePlatform::new("telegram", true);
        let (disc, _disc_state) = FakePlatform::with_unreachable("discord", true, vec![dc.clone()]);
        let mut platforms: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        platforms.insert(Platform::Telegram, telegram);
        platforms.insert(Platform::Discord, disc);

        let worker = Worker::new(topology, store.clone(), empty_filter(), platforms, None);
        let msg = CanonicalMessage::from_irc(a.clone(), "alice!~a@host", "alice", "hi", "I", None);
        run_and_drain(worker, vec![QueueItem::Forward(msg)]).await;

        assert_eq!(telegram_state.lock().unwrap().sent.len(), 1);

        let record = store.get(1).unwrap().unwrap();
        let discord_entry = record.find_entry(&dc).unwrap();
        assert_eq!(discord_entry.message_id, None);
        let telegram_entry = record.find_entry(&tgc).unwrap();
        assert!(telegram_entry.message_id.is_some());
    }

    #[tokio::test]
    async fn s6_filter_blocks_per_peer_not_only_at_ingress() {
        let a = irc("#a");
        let tgc = tg("100");
        let dc = discord("200");
        let topology = Arc::new(Topology::from_groups(&[vec![a.clone(), tgc.clone(), dc.clone()]]));
        let store = Arc::new(MessageStore::open_in_memory().unwrap());

        let (telegram, telegram_state) = FakePlatform::new("telegram", true);
        let (disc, disc_state) = FakePlatform::new("discord", true);
        let mut platforms: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        platforms.insert(Platform::Telegram, telegram);
        platforms.insert(Platform::Discord, disc);

        let filter_config = FilterConfig {
            filters: vec![FilterRule {
                event: "send".into(),
                group: "irc/#a".into(),
                text: Some("secret".into()),
                nick: None,
                fwd_from: None,
                filter_reply: true,
            }],
        };
        let filter = Arc::new(Filter::compile(&filter_config, SpamCheckConfig::default()).unwrap());

        let worker = Worker::new(topology, store.clone(), filter, platforms, None);
        let msg = CanonicalMessage::from_irc(a, "alice!~a@host", "alice", "this is secret", "I", None);
        run_and_drain(worker, vec![QueueItem::Forward(msg)]).await;

        // Blocked on every peer since the rule matches the origin group for
        // a `send` event regardless of destination (the rule is consulted
        // per-peer inside the fan-out loop, not once at ingress).
        assert!(telegram_state.lock().unwrap().sent.is_empty());
        assert!(disc_state.lock().unwrap().sent.is_empty());

        let record = store.get(1).unwrap().unwrap();
        assert_eq!(record.bridge_messages.len(), 1, "origin entry is still written even though every peer was blocked");
    }

    #[tokio::test]
    async fn unique_binding_never_duplicates_group_message_id_pairs() {
        let a = irc("a");
        let c = tg("100");
        let topology = Arc::new(Topology::from_groups(&[vec![a.clone(), c.clone()]]));
        let store = Arc::new(MessageStore::open_in_memory().unwrap());
        let (telegram, _state) = FakePlatform::new("telegram", true);
        let mut platforms: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
        platforms.insert(Platform::Telegram, telegram);

        let worker = Worker::new(topology, store.clone(), empty_filter(), platforms, None);
        let m1 = CanonicalMessage::from_irc(a.clone(), "alice!~a@host", "alice", "one", "I", None);
        let m2 = CanonicalMessage::from_irc(a, "alice!~a@host", "alice", "two", "I", None);
        run_and_drain(worker, vec![QueueItem::Forward(m1), QueueItem::Forward(m2)]).await;

        let r1 = store.get(1).unwrap().unwrap();
        let r2 = store.get(2).unwrap().unwrap();
        let id1 = r1.find_entry(&c).unwrap().message_id.clone();
        let id2 = r2.find_entry(&c).unwrap().message_id.clone();
        assert_ne!(id1, id2);
    }
}
