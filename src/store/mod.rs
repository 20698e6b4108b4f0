//! Message Store: the durable record of every bridged message (spec.md §3,
//! §4.3). Backed by SQLite; `bridge_messages` and `files` are stored as JSON
//! columns since their shape is a small bounded list, not a join target.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::channel_id::ChannelId;
use crate::config::StoreConfig;
use crate::model::{BridgeEntry, CanonicalMessage, File, StoredRecord};

/// Active-user lookback constant (original_source `to_list(length=10)`):
/// at most this many distinct (group, user) pairs are considered "recently
/// active" for the `/names`-style IRC roster heuristics.
pub const ACTIVE_LOOKBACK_LIMIT: usize = 10;

pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create store dir: {}", parent.display()))?;
            }
        }

        let conn = Connection::open(&config.path)
            .with_context(|| format!("failed to open message store: {}", config.path.display()))?;

        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA busy_timeout = {};",
            config.busy_timeout_ms
        ))?;

        Self::init_schema(&conn)?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests; same schema, no file on disk.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                system          INTEGER NOT NULL DEFAULT 0,
                deleted         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                edited_at       TEXT,
                deleted_at      TEXT,
                from_user_id    TEXT NOT NULL DEFAULT '',
                from_nick       TEXT NOT NULL DEFAULT '',
                text            TEXT NOT NULL DEFAULT '',
                fwd_from        TEXT,
                reply_to        INTEGER,
                files           TEXT NOT NULL DEFAULT '[]',
                bridge_messages TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);
            CREATE INDEX IF NOT EXISTS idx_records_deleted ON records(deleted);
            CREATE INDEX IF NOT EXISTS idx_records_from_user_id ON records(from_user_id);",
        )?;
        Ok(())
    }

    /// Insert a new record for a freshly relayed message; `bridge_messages`
    /// must already contain the origin entry as element 0 (spec.md §3).
    pub fn insert(&self, record: &StoredRecord) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO records
                (system, deleted, created_at, edited_at, deleted_at,
                 from_user_id, from_nick, text, fwd_from, reply_to,
                 files, bridge_messages)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.system,
                record.deleted,
                record.created_at.to_rfc3339(),
                record.edited_at.map(|t| t.to_rfc3339()),
                record.deleted_at.map(|t| t.to_rfc3339()),
                record.from_user_id,
                record.from_nick,
                record.text,
                record.fwd_from,
                record.reply_to,
                serde_json::to_string(&record.files)?,
                serde_json::to_string(&record.bridge_messages)?,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get(&self, id: i64) -> Result<Option<StoredRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, system, deleted, created_at, edited_at, deleted_at,
                    from_user_id, from_nick, text, fwd_from, reply_to, files, bridge_messages
             FROM records WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }

    /// Find the record whose `bridge_messages` contains an entry for
    /// `group` with native id `message_id` — how a platform's own edit/
    /// delete webhook resolves back to our record (spec.md §4.5 step 4).
    pub fn find_by_member(&self, group: &ChannelId, message_id: &str) -> Result<Option<StoredRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, system, deleted, created_at, edited_at, deleted_at,
                    from_user_id, from_nick, text, fwd_from, reply_to, files, bridge_messages
             FROM records WHERE deleted = 0 AND bridge_messages LIKE ?1
             ORDER BY id DESC LIMIT 200",
        )?;
        // Narrow with a LIKE prefilter on the JSON blob, then confirm the
        // exact (group, message_id) match in Rust; SQLite has no native
        // JSON array containment operator without the json1 extension tables.
        let needle = format!("%\"{}\"%", message_id);
        let mut rows = stmt.query(params![needle])?;
        while let Some(row) = rows.next()? {
            let record = row_to_record(row)?;
            if record.find_entry(group).and_then(|e| e.message_id.as_deref()) == Some(message_id) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Apply the outbound-only rule and return only records/entries that an
    /// edit or delete originating in `origin_group` may touch.
    pub fn find_and_filter_for_update(
        &self,
        topology: &crate::topology::Topology,
        record_id: i64,
        origin_group: &ChannelId,
    ) -> Result<Vec<BridgeEntry>> {
        let record = self
            .get(record_id)?
            .context("record vanished between lookup and update")?;
        Ok(topology
            .update_targets(&record, origin_group)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn mark_edited(&self, id: i64, new_text: &str, edited_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE records SET text = ?1, edited_at = ?2 WHERE id = ?3",
            params![new_text, edited_at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Record a relayed message id for a peer once the send has completed
    /// (spec.md §4.5 step 3: "append an entry to bridge_messages").
    pub fn append_bridge_entry(&self, id: i64, entry: &BridgeEntry) -> Result<()> {
        let record = self.get(id)?.context("record not found")?;
        let mut entries = record.bridge_messages;
        entries.push(entry.clone());
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE records SET bridge_messages = ?1 WHERE id = ?2",
            params![serde_json::to_string(&entries)?, id],
        )?;
        Ok(())
    }

    /// Soft-delete a record and best-effort unlink any locally-held files
    /// (original_source `delete_message_record`: deletion never fails the
    /// caller because of a missing file on disk).
    pub fn mark_deleted(&self, id: i64, deleted_at: DateTime<Utc>) -> Result<()> {
        let record = self.get(id)?.context("record not found")?;
        for file in &record.files {
            if file.is_empty() {
                continue;
            }
            if let Err(err) = std::fs::remove_file(&file.local_path) {
                tracing::warn!(path = %file.local_path, error = %err, "failed to remove local file for deleted record");
            }
        }

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE records SET deleted = 1, deleted_at = ?1 WHERE id = ?2",
            params![deleted_at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Groups with at least one non-system message from `from_user_id` in
    /// the last `window` (spec.md §4.1 IRC table: "active within the last
    /// 600s"), capped at [`ACTIVE_LOOKBACK_LIMIT`] most recent matches.
    pub fn recent_active_groups(&self, from_user_id: &str, window: chrono::Duration) -> Result<Vec<ChannelId>> {
        let since = Utc::now() - window;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT bridge_messages FROM records
             WHERE system = 0 AND from_user_id = ?1 AND created_at >= ?2
             ORDER BY created_at DESC LIMIT ?3",
        )?;
        let mut rows = stmt.query(params![from_user_id, since.to_rfc3339(), ACTIVE_LOOKBACK_LIMIT as i64])?;

        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let entries: Vec<BridgeEntry> = serde_json::from_str(&raw).unwrap_or_default();
            if let Some(origin) = entries.first() {
                if !groups.contains(&origin.group) {
                    groups.push(origin.group.clone());
                }
            }
        }
        Ok(groups)
    }

    /// Every record with a Telegram leg, for the delete poller's sweep
    /// (spec.md §4.6). Bounded to the most recent `limit` per the poller's
    /// window so a long-dead group doesn't grow the query unbounded.
    pub fn recent_records_with_group(&self, group: &ChannelId, limit: usize) -> Result<Vec<StoredRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, system, deleted, created_at, edited_at, deleted_at,
                    from_user_id, from_nick, text, fwd_from, reply_to, files, bridge_messages
             FROM records WHERE deleted = 0 AND bridge_messages LIKE ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let needle = format!("%\"{}\"%", group.as_str());
        let mut rows = stmt.query(params![needle, limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let record = row_to_record(row)?;
            if record.find_entry(group).is_some() {
                out.push(record);
            }
        }
        Ok(out)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<StoredRecord> {
    let files_raw: String = row.get(11)?;
    let bridge_raw: String = row.get(12)?;
    Ok(StoredRecord {
        id: row.get(0)?,
        system: row.get(1)?,
        deleted: row.get(2)?,
        created_at: parse_ts(row.get(3)?),
        edited_at: row.get::<_, Option<String>>(4)?.map(parse_ts),
        deleted_at: row.get::<_, Option<String>>(5)?.map(parse_ts),
        from_user_id: row.get(6)?,
        from_nick: row.get(7)?,
        text: row.get(8)?,
        fwd_from: row.get(9)?,
        reply_to: row.get(10)?,
        files: serde_json::from_str::<Vec<File>>(&files_raw).unwrap_or_default(),
        bridge_messages: serde_json::from_str::<Vec<BridgeEntry>>(&bridge_raw).unwrap_or_default(),
    })
}

fn parse_ts(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Build a `StoredRecord` out of a freshly-received [`CanonicalMessage`],
/// seeding `bridge_messages` with its own origin entry.
pub fn record_from_canonical(msg: &CanonicalMessage, reply_to: Option<i64>) -> StoredRecord {
    StoredRecord {
        id: 0,
        system: msg.system,
        deleted: false,
        created_at: msg.created_at,
        edited_at: msg.edited_at,
        deleted_at: None,
        from_user_id: msg.from_user_id.clone(),
        from_nick: msg.from_nick.clone(),
        text: msg.text.clone(),
        fwd_from: msg.fwd_from.clone(),
        reply_to,
        files: msg.files.clone(),
        bridge_messages: vec![BridgeEntry::new(msg.from_group.clone(), msg.from_message_id.clone())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_id::Platform;
    use crate::topology::Topology;

    fn sample_record(origin: ChannelId) -> StoredRecord {
        StoredRecord {
            id: 0,
            system: false,
            deleted: false,
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
            from_user_id: "1".into(),
            from_nick: "alice".into(),
            text: "hi".into(),
            fwd_from: None,
            reply_to: None,
            files: Vec::new(),
            bridge_messages: vec![BridgeEntry::new(origin, None)],
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let store = MessageStore::open_in_memory().unwrap();
        let origin = ChannelId::new(Platform::Irc, "#a");
        let id = store.insert(&sample_record(origin.clone())).unwrap();

        let fetched = store.get(id).unwrap().unwrap();
        assert_eq!(fetched.text, "hi");
        assert_eq!(fetched.origin().unwrap().group, origin);
    }

    #[test]
    fn append_bridge_entry_then_find_by_member() {
        let store = MessageStore::open_in_memory().unwrap();
        let origin = ChannelId::new(Platform::Irc, "#a");
        let peer = ChannelId::new(Platform::Telegram, "100");
        let id = store.insert(&sample_record(origin)).unwrap();

        store
            .append_bridge_entry(id, &BridgeEntry::new(peer.clone(), Some("42".into())))
            .unwrap();

        let found = store.find_by_member(&peer, "42").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(store.find_by_member(&peer, "999").unwrap().is_none());
    }

    #[test]
    fn mark_deleted_is_idempotent_and_sets_flag() {
        let store = MessageStore::open_in_memory().unwrap();
        let id = store
            .insert(&sample_record(ChannelId::new(Platform::Irc, "#a")))
            .unwrap();

        store.mark_deleted(id, Utc::now()).unwrap();
        let record = store.get(id).unwrap().unwrap();
        assert!(record.deleted);

        // A second delete of the same record must not error (spec.md §8 S3).
        store.mark_deleted(id, Utc::now()).unwrap();
    }

    #[test]
    fn find_and_filter_for_update_respects_outbound_only_rule() {
        let store = MessageStore::open_in_memory().unwrap();
        let a = ChannelId::new(Platform::Irc, "a");
        let c = ChannelId::new(Platform::Irc, "c");
        let d = ChannelId::new(Platform::Irc, "d");
        let topo = Topology::from_groups(&[vec![a.clone(), c.clone()], vec![c.clone(), d.clone()]]);

        let mut record = sample_record(a.clone());
        record.bridge_messages.push(BridgeEntry::new(c.clone(), Some("1".into())));
        record.bridge_messages.push(BridgeEntry::new(d.clone(), Some("2".into())));
        let id = store.insert(&record).unwrap();

        let targets = store.find_and_filter_for_update(&topo, id, &c).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].group, d);
    }

    #[test]
    fn recent_active_groups_excludes_old_and_system_messages() {
        let store = MessageStore::open_in_memory().unwrap();
        let group = ChannelId::new(Platform::Irc, "#a");
        store.insert(&sample_record(group.clone())).unwrap();

        let groups = store.recent_active_groups("1", Duration::seconds(600)).unwrap();
        assert_eq!(groups, vec![group]);

        let none = store.recent_active_groups("nobody", Duration::seconds(600)).unwrap();
        assert!(none.is_empty());
    }
}
