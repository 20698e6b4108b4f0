//! Bridge Topology: resolves a channel to its outbound peers (spec.md §3,
//! §4.2). Derived once from configuration; directed, not symmetric.

use std::collections::HashMap;

use tracing::warn;

use crate::channel_id::ChannelId;
use crate::model::{BridgeEntry, StoredRecord};

#[derive(Debug, Clone, Default)]
pub struct Topology {
    peers: HashMap<ChannelId, Vec<ChannelId>>,
}

impl Topology {
    /// Build from a config list of groups `[[A,B,C],[C,D]]`: for each group,
    /// every member's peer list is the others in that group. Duplicate
    /// membership across groups is legal and last-write-wins with a
    /// warning (spec.md §3).
    pub fn from_groups(groups: &[Vec<ChannelId>]) -> Self {
        let mut peers: HashMap<ChannelId, Vec<ChannelId>> = HashMap::new();

        for group in groups {
            for (i, member) in group.iter().enumerate() {
                let others: Vec<ChannelId> = group
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, c)| c.clone())
                    .collect();

                if peers.contains_key(member) {
                    warn!(
                        channel = %member,
                        "channel appears in more than one bridge group; last group wins"
                    );
                }
                peers.insert(member.clone(), others);
            }
        }

        Self { peers }
    }

    /// `peers(g) → list<ChannelID>`.
    pub fn peers(&self, group: &ChannelId) -> &[ChannelId] {
        self.peers.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_bridged(&self, group: &ChannelId) -> bool {
        self.peers.contains_key(group)
    }

    /// The outbound-only rule (spec.md §4.2): the set of a record's bridge
    /// entries whose group is a declared peer of `origin_group`.
    pub fn update_targets<'a>(
        &self,
        record: &'a StoredRecord,
        origin_group: &ChannelId,
    ) -> Vec<&'a BridgeEntry> {
        let allowed = self.peers(origin_group);
        record
            .bridge_messages
            .iter()
            .filter(|e| allowed.contains(&e.group))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_id::Platform;
    use chrono::Utc;

    fn irc(id: &str) -> ChannelId {
        ChannelId::new(Platform::Irc, id)
    }
    fn tg(id: &str) -> ChannelId {
        ChannelId::new(Platform::Telegram, id)
    }

    #[test]
    fn simple_group_peers_are_symmetric() {
        let topo = Topology::from_groups(&[vec![irc("#a"), tg("100")]]);
        assert_eq!(topo.peers(&irc("#a")), &[tg("100")]);
        assert_eq!(topo.peers(&tg("100")), &[irc("#a")]);
    }

    #[test]
    fn chain_topology_is_directed() {
        // [[A,C],[C,D]]
        let a = irc("a");
        let c = irc("c");
        let d = irc("d");
        let topo = Topology::from_groups(&[vec![a.clone(), c.clone()], vec![c.clone(), d.clone()]]);

        assert_eq!(topo.peers(&a), &[c.clone()]);
        // C's peers reflect only its own group membership: [C,D] was
        // declared last, so C's peers are {D}, not {A,D}.
        assert_eq!(topo.peers(&c), &[d.clone()]);
        assert_eq!(topo.peers(&d), &[c.clone()]);
    }

    #[test]
    fn update_targets_excludes_origin_and_non_peers() {
        let a = irc("a");
        let c = irc("c");
        let d = irc("d");
        let topo = Topology::from_groups(&[vec![a.clone(), c.clone()], vec![c.clone(), d.clone()]]);

        let record = StoredRecord {
            id: 1,
            system: false,
            deleted: false,
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
            from_user_id: String::new(),
            from_nick: String::new(),
            text: String::new(),
            fwd_from: None,
            reply_to: None,
            files: Vec::new(),
            bridge_messages: vec![
                BridgeEntry::new(c.clone(), Some("1".into())),
                BridgeEntry::new(d.clone(), Some("2".into())),
            ],
        };

        // A message that travelled A->C->D: an edit/delete originating in
        // C must only reach D, never bounce back to A.
        let targets = topo.update_targets(&record, &c);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].group, d);
    }

    #[test]
    fn unbridged_channel_has_no_peers() {
        let topo = Topology::from_groups(&[vec![irc("#a"), tg("100")]]);
        assert!(topo.peers(&irc("#unrelated")).is_empty());
        assert!(!topo.is_bridged(&irc("#unrelated")));
    }
}
