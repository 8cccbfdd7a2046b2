//! SQLite-backed chunk storage.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::chunk::{ChunkId, ChunkMetadata, StoredChunk};
use crate::error::{ChunkStoreError, Result};

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS chunks (
        id       INTEGER PRIMARY KEY,
        text     TEXT    NOT NULL,
        metadata TEXT    NOT NULL
    );
    CREATE TABLE IF NOT EXISTS id_watermark (
        singleton INTEGER PRIMARY KEY CHECK (singleton = 0),
        next_id   INTEGER NOT NULL
    );
";

const FIRST_ID: ChunkId = 1;

/// Storage for chunk rows.
///
/// Ids come from an in-memory counter seeded from the highest id ever
/// issued. The counter's high-water mark is written inside every commit and
/// right after every rollback, so ids discarded by a rollback stay unused
/// across process restarts.
pub struct ChunkStore {
    /// Open database connection.
    conn: Connection,

    /// Path of the database file.
    path: PathBuf,

    /// Next id to hand out.
    next_id: ChunkId,

    /// Ids inserted in the currently open unit of work.
    pending: Vec<ChunkId>,
}

impl ChunkStore {
    /// Open or create the store at the given path.
    ///
    /// Creates parent directories and the schema if needed. Safe to call on
    /// an existing store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Chunk store journal mode: {journal_mode}");
        conn.execute_batch(SCHEMA_SQL)?;

        let max_id: Option<ChunkId> =
            conn.query_row("SELECT MAX(id) FROM chunks", [], |row| row.get(0))?;
        let watermark: Option<ChunkId> = conn
            .query_row("SELECT next_id FROM id_watermark WHERE singleton = 0", [], |row| {
                row.get(0)
            })
            .optional()?;

        let next_id = max_id
            .map_or(FIRST_ID, |m| m + 1)
            .max(watermark.unwrap_or(FIRST_ID));

        info!("Opened chunk store at {} (next id {next_id})", path.display());

        Ok(Self {
            conn,
            path,
            next_id,
            pending: Vec::new(),
        })
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a unit of work is open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Ids inserted since the last commit or rollback.
    pub fn pending_ids(&self) -> &[ChunkId] {
        &self.pending
    }

    /// Append a row and return its newly issued id.
    ///
    /// The row stays uncommitted until [`commit`](Self::commit).
    pub fn insert(&mut self, text: &str, metadata: &ChunkMetadata) -> Result<ChunkId> {
        if text.trim().is_empty() {
            return Err(ChunkStoreError::EmptyText);
        }

        if !self.in_transaction() {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
        }

        let id = self.next_id;
        self.next_id += 1;

        let metadata_json = serde_json::to_string(metadata)?;
        self.conn.execute(
            "INSERT INTO chunks (id, text, metadata) VALUES (?1, ?2, ?3)",
            params![id, text, metadata_json],
        )?;
        self.pending.push(id);

        debug!("Inserted chunk {id}");
        Ok(id)
    }

    /// Make every insert since the last commit durable.
    ///
    /// Returns the number of rows committed.
    pub fn commit(&mut self) -> Result<usize> {
        if !self.in_transaction() {
            return Ok(0);
        }

        self.write_watermark()?;
        self.conn.execute_batch("COMMIT")?;

        let committed = self.pending.len();
        if let (Some(first), Some(last)) = (self.pending.first(), self.pending.last()) {
            info!("Committed {committed} chunks (ids {first}..={last})");
        }
        self.pending.clear();
        Ok(committed)
    }

    /// Discard every insert since the last commit.
    ///
    /// Returns the discarded ids. They will not be issued again.
    pub fn rollback(&mut self) -> Result<Vec<ChunkId>> {
        let discarded = std::mem::take(&mut self.pending);
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        self.write_watermark()?;

        if !discarded.is_empty() {
            warn!("Rolled back {} uncommitted chunks", discarded.len());
        }
        Ok(discarded)
    }

    fn write_watermark(&self) -> Result<()> {
        self.conn.execute(
            "INSERT INTO id_watermark (singleton, next_id) VALUES (0, ?1)
             ON CONFLICT(singleton) DO UPDATE SET next_id = excluded.next_id",
            params![self.next_id],
        )?;
        Ok(())
    }

    /// Look up a chunk by id.
    pub fn get(&self, id: ChunkId) -> Result<StoredChunk> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT text, metadata FROM chunks WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (text, metadata_json) = row.ok_or(ChunkStoreError::NotFound(id))?;
        let metadata = decode_metadata(id, &metadata_json)?;

        Ok(StoredChunk { id, text, metadata })
    }

    /// Check if a row with this id exists.
    pub fn contains(&self, id: ChunkId) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM chunks WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of rows visible to this connection.
    pub fn row_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// All row ids in ascending order.
    pub fn ids(&self) -> Result<Vec<ChunkId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM chunks ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<ChunkId>, _>>()?;
        Ok(ids)
    }

    /// Every stored chunk in id order.
    pub fn all(&self) -> Result<Vec<StoredChunk>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, text, metadata FROM chunks ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, ChunkId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, text, metadata_json)| {
                Ok(StoredChunk {
                    id,
                    text,
                    metadata: decode_metadata(id, &metadata_json)?,
                })
            })
            .collect()
    }
}

fn decode_metadata(id: ChunkId, json: &str) -> Result<ChunkMetadata> {
    serde_json::from_str(json).map_err(|e| ChunkStoreError::InvalidRow {
        id,
        reason: format!("metadata: {e}"),
    })
}
