//! SQLite-backed archive of records, collections and reconstructions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::helpers::{
    row_to_membership, row_to_record, row_to_thread_record, RECORD_COLUMNS,
};
use super::{ArchiveStore, Result};
use crate::models::{
    Checkpoint, CollectionKind, CollectionMembership, Record, ThreadRecord,
};

/// Parent edge of one record inside a reconstructed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEdge {
    pub thread_id: String,
    pub record_id: String,
    pub parent_id: Option<String>,
    pub depth: u32,
    pub fetched_at: DateTime<Utc>,
}

/// A stored self-reply whose parent is missing from the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct IncompleteThread {
    pub record_id: String,
    pub missing_parent_id: String,
    pub conversation_id: Option<String>,
}

/// Archive-wide counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveStats {
    pub records: u64,
    pub tombstones: u64,
    pub thread_records: u64,
    pub memberships: BTreeMap<String, u64>,
    pub checkpoints: Vec<Checkpoint>,
}

/// SQLite-backed archive store.
pub struct SqliteArchive {
    db_path: PathBuf,
}

impl SqliteArchive {
    /// Open (and create if needed) the archive at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL DEFAULT '',
                author_id TEXT NOT NULL,
                author_username TEXT NOT NULL,
                author_display_name TEXT,
                author_avatar_url TEXT,
                created_at TEXT NOT NULL,
                conversation_id TEXT,
                in_reply_to_id TEXT,
                in_reply_to_user_id TEXT,
                quoted_id TEXT,
                reposted_id TEXT,
                is_repost INTEGER NOT NULL DEFAULT 0,
                reply_count INTEGER NOT NULL DEFAULT 0,
                repost_count INTEGER NOT NULL DEFAULT 0,
                like_count INTEGER NOT NULL DEFAULT 0,
                quote_count INTEGER NOT NULL DEFAULT 0,
                tombstone_reason TEXT,
                raw_json TEXT,
                first_seen_at TEXT NOT NULL,
                last_updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memberships (
                record_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                folder_id TEXT,
                folder_name TEXT,
                added_at TEXT NOT NULL,
                synced_at TEXT NOT NULL,
                sort_index INTEGER NOT NULL,
                PRIMARY KEY (record_id, kind)
            );

            -- Monotonic sort index allocator per collection kind
            CREATE TABLE IF NOT EXISTS sort_counters (
                kind TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                kind TEXT PRIMARY KEY,
                cursor TEXT,
                last_record_id TEXT,
                total_synced INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                started_at TEXT,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS thread_records (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                root_record_id TEXT NOT NULL,
                focal_record_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                record_count INTEGER NOT NULL,
                is_complete INTEGER NOT NULL,
                fetched_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS thread_edges (
                thread_id TEXT NOT NULL,
                record_id TEXT NOT NULL,
                parent_id TEXT,
                depth INTEGER NOT NULL,
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (thread_id, record_id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_conversation
                ON records(conversation_id);
            CREATE INDEX IF NOT EXISTS idx_records_reply_to
                ON records(in_reply_to_id);
            CREATE INDEX IF NOT EXISTS idx_memberships_kind_sort
                ON memberships(kind, sort_index);
            CREATE INDEX IF NOT EXISTS idx_thread_records_focal
                ON thread_records(focal_record_id);
        "#,
        )?;
        Ok(())
    }

    /// Get a record by id.
    pub fn get_record(&self, id: &str) -> Result<Option<Record>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_record).optional()?)
    }

    /// Memberships of a kind, in assignment order.
    pub fn memberships(&self, kind: CollectionKind) -> Result<Vec<CollectionMembership>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM memberships WHERE kind = ? ORDER BY sort_index ASC",
        )?;
        let rows = stmt
            .query_map(params![kind.as_str()], row_to_membership)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Reconstruction summaries for a focal record, newest first.
    pub fn thread_records_for(&self, focal_id: &str) -> Result<Vec<ThreadRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM thread_records WHERE focal_record_id = ? ORDER BY fetched_at DESC",
        )?;
        let rows = stmt
            .query_map(params![focal_id], row_to_thread_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Parent edges stored for one reconstruction.
    pub fn thread_edges(&self, thread_id: &str) -> Result<Vec<ThreadEdge>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, parent_id, depth, fetched_at FROM thread_edges
             WHERE thread_id = ? ORDER BY depth ASC, record_id ASC",
        )?;
        let rows = stmt
            .query_map(params![thread_id], |row| {
                Ok(ThreadEdge {
                    thread_id: thread_id.to_string(),
                    record_id: row.get(0)?,
                    parent_id: row.get(1)?,
                    depth: row.get::<_, i64>(2)? as u32,
                    fetched_at: super::parse_datetime(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Self-replies by `author_id` whose parent record is not archived.
    pub fn find_incomplete_threads(&self, author_id: &str) -> Result<Vec<IncompleteThread>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"SELECT r.id, r.in_reply_to_id, r.conversation_id
               FROM records r
               WHERE r.author_id = ?1
                 AND r.in_reply_to_user_id = ?1
                 AND r.in_reply_to_id IS NOT NULL
                 AND r.in_reply_to_id != ''
                 AND r.is_repost = 0
                 AND NOT EXISTS (SELECT 1 FROM records p WHERE p.id = r.in_reply_to_id)
               ORDER BY r.created_at ASC"#,
        )?;
        let rows = stmt
            .query_map(params![author_id], |row| {
                Ok(IncompleteThread {
                    record_id: row.get(0)?,
                    missing_parent_id: row.get(1)?,
                    conversation_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Counters across the whole archive.
    pub fn stats(&self) -> Result<ArchiveStats> {
        let conn = self.connect()?;
        let records: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
        let tombstones: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE tombstone_reason IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let thread_records: i64 =
            conn.query_row("SELECT COUNT(*) FROM thread_records", [], |r| r.get(0))?;

        let mut memberships = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM memberships GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            memberships.insert(kind, count as u64);
        }

        Ok(ArchiveStats {
            records: records as u64,
            tombstones: tombstones as u64,
            thread_records: thread_records as u64,
            memberships,
            checkpoints: self.list_checkpoints()?,
        })
    }
}

impl ArchiveStore for SqliteArchive {
    fn upsert_record(&self, record: &Record) -> Result<()> {
        let conn = self.connect()?;
        let raw = record
            .raw
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // Real content always wins over a tombstone, never the other way round.
        conn.execute(
            r#"INSERT INTO records (
                id, text, author_id, author_username, author_display_name,
                author_avatar_url, created_at, conversation_id, in_reply_to_id,
                in_reply_to_user_id, quoted_id, reposted_id, is_repost, reply_count,
                repost_count, like_count, quote_count, tombstone_reason, raw_json,
                first_seen_at, last_updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      ?15, ?16, ?17, ?18, ?19, ?20, ?21)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                author_id = excluded.author_id,
                author_username = excluded.author_username,
                author_display_name = COALESCE(excluded.author_display_name, records.author_display_name),
                author_avatar_url = COALESCE(excluded.author_avatar_url, records.author_avatar_url),
                created_at = excluded.created_at,
                conversation_id = COALESCE(excluded.conversation_id, records.conversation_id),
                in_reply_to_id = COALESCE(excluded.in_reply_to_id, records.in_reply_to_id),
                in_reply_to_user_id = COALESCE(excluded.in_reply_to_user_id, records.in_reply_to_user_id),
                quoted_id = COALESCE(excluded.quoted_id, records.quoted_id),
                reposted_id = COALESCE(excluded.reposted_id, records.reposted_id),
                is_repost = excluded.is_repost,
                reply_count = excluded.reply_count,
                repost_count = excluded.repost_count,
                like_count = excluded.like_count,
                quote_count = excluded.quote_count,
                tombstone_reason = excluded.tombstone_reason,
                raw_json = COALESCE(excluded.raw_json, records.raw_json),
                last_updated_at = excluded.last_updated_at
            WHERE excluded.tombstone_reason IS NULL OR records.tombstone_reason IS NOT NULL"#,
            params![
                record.id,
                record.text,
                record.author_id,
                record.author_username,
                record.author_display_name,
                record.author_avatar_url,
                record.created_at.to_rfc3339(),
                record.conversation_id,
                record.in_reply_to_id,
                record.in_reply_to_user_id,
                record.quoted_id,
                record.reposted_id,
                record.is_repost as i32,
                record.reply_count,
                record.repost_count,
                record.like_count,
                record.quote_count,
                record.tombstone.map(|t| t.as_str()),
                raw,
                record.first_seen_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn upsert_membership(&self, membership: &CollectionMembership) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"INSERT INTO memberships
                (record_id, kind, folder_id, folder_name, added_at, synced_at, sort_index)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(record_id, kind) DO UPDATE SET
                folder_id = COALESCE(excluded.folder_id, memberships.folder_id),
                folder_name = COALESCE(excluded.folder_name, memberships.folder_name),
                synced_at = excluded.synced_at"#,
            params![
                membership.record_id,
                membership.kind.as_str(),
                membership.folder_id,
                membership.folder_name,
                membership.added_at.to_rfc3339(),
                membership.synced_at.to_rfc3339(),
                membership.sort_index,
            ],
        )?;
        Ok(())
    }

    fn record_exists(&self, id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn collection_contains(&self, kind: CollectionKind, record_id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM memberships WHERE kind = ? AND record_id = ?)",
            params![kind.as_str(), record_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn upsert_thread_record(&self, thread: &ThreadRecord) -> Result<()> {
        let conn = self.connect()?;
        // Summaries are immutable; a rerun writes a new id.
        conn.execute(
            r#"INSERT OR IGNORE INTO thread_records
                (id, conversation_id, root_record_id, focal_record_id, author_id,
                 mode, record_count, is_complete, fetched_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                thread.id,
                thread.conversation_id,
                thread.root_record_id,
                thread.focal_record_id,
                thread.author_id,
                thread.mode.as_str(),
                thread.record_count as i64,
                thread.is_complete as i32,
                thread.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn save_thread_edges(&self, edges: &[ThreadEdge]) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT OR REPLACE INTO thread_edges
                    (thread_id, record_id, parent_id, depth, fetched_at)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
            )?;
            for edge in edges {
                stmt.execute(params![
                    edge.thread_id,
                    edge.record_id,
                    edge.parent_id,
                    edge.depth as i64,
                    edge.fetched_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn next_sort_index(&self, kind: CollectionKind) -> Result<i64> {
        let conn = self.connect()?;
        let value: i64 = conn.query_row(
            r#"INSERT INTO sort_counters (kind, value) VALUES (?1, 1)
               ON CONFLICT(kind) DO UPDATE SET value = value + 1
               RETURNING value"#,
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(value)
    }
}
