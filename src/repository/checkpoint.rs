//! Checkpoint persistence for the archive.

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::helpers::row_to_checkpoint_row;
use super::{CheckpointStore, Result, SqliteArchive};
use crate::models::Checkpoint;

impl SqliteArchive {
    /// All readable checkpoints. Corrupt rows are skipped.
    pub fn list_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM checkpoints ORDER BY kind")?;
        let rows = stmt
            .query_map([], row_to_checkpoint_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|row| Checkpoint::try_from(row).ok())
            .collect())
    }
}

impl CheckpointStore for SqliteArchive {
    fn load(&self, kind: &str) -> Result<Option<Checkpoint>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT * FROM checkpoints WHERE kind = ?",
                params![kind],
                row_to_checkpoint_row,
            )
            .optional()?;
        row.map(Checkpoint::try_from).transpose()
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"INSERT INTO checkpoints
                (kind, cursor, last_record_id, total_synced, status, started_at, completed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(kind) DO UPDATE SET
                cursor = excluded.cursor,
                last_record_id = excluded.last_record_id,
                total_synced = excluded.total_synced,
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at"#,
            params![
                checkpoint.kind,
                checkpoint.cursor,
                checkpoint.last_record_id,
                checkpoint.total_synced as i64,
                checkpoint.status.as_str(),
                checkpoint.started_at.map(|t| t.to_rfc3339()),
                checkpoint.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        debug!(
            "Saved checkpoint {}: status={} total={}",
            checkpoint.kind,
            checkpoint.status.as_str(),
            checkpoint.total_synced
        );
        Ok(())
    }

    fn clear(&self, kind: &str) -> Result<()> {
        self.save(&Checkpoint::pending(kind))
    }
}
