use std::sync::Mutex;

use relay_core::types::{ChannelId, ChannelPair};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::db::{init_db, PAIRS_CONFIGURED_KEY};
use crate::error::{Result, StoreError};
use crate::store::RelayStore;

/// SQLite-backed store.
///
/// Wraps a single connection in a `Mutex`; every whole-set write runs inside
/// one transaction so readers never observe a half-written table.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an open connection, running the schema migrations first.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    /// Ephemeral database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RelayStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(skip(self))]
    fn load_pairs(&self) -> Result<Option<Vec<ChannelPair>>> {
        let db = self.conn()?;

        let configured: Option<String> = db
            .query_row(
                "SELECT value FROM relay_meta WHERE key = ?1",
                params![PAIRS_CONFIGURED_KEY],
                |row| row.get(0),
            )
            .optional()?;
        if configured.is_none() {
            return Ok(None);
        }

        let mut stmt = db.prepare(
            "SELECT source, destination, name FROM channel_pairs ORDER BY position ASC",
        )?;
        let pairs = stmt
            .query_map([], |row| {
                Ok(ChannelPair {
                    source: ChannelId(row.get::<_, i64>(0)? as u64),
                    destination: ChannelId(row.get::<_, i64>(1)? as u64),
                    name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(count = pairs.len(), "loaded channel pairs");
        Ok(Some(pairs))
    }

    #[instrument(skip(self, pairs), fields(count = pairs.len()))]
    fn save_pairs(&self, pairs: &[ChannelPair]) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        tx.execute("DELETE FROM channel_pairs", [])?;
        for (position, pair) in pairs.iter().enumerate() {
            tx.execute(
                "INSERT INTO channel_pairs (position, source, destination, name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    position as i64,
                    pair.source.get() as i64,
                    pair.destination.get() as i64,
                    pair.name
                ],
            )?;
        }
        tx.execute(
            "INSERT INTO relay_meta (key, value, updated_at) VALUES (?1, 'true', ?2)
             ON CONFLICT(key) DO UPDATE SET updated_at = excluded.updated_at",
            params![PAIRS_CONFIGURED_KEY, chrono::Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn load_filters(&self) -> Result<Vec<String>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT phrase FROM filter_words ORDER BY position ASC")?;
        let filters = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(filters)
    }

    #[instrument(skip(self, filters), fields(count = filters.len()))]
    fn save_filters(&self, filters: &[String]) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        tx.execute("DELETE FROM filter_words", [])?;
        for (position, phrase) in filters.iter().enumerate() {
            tx.execute(
                "INSERT INTO filter_words (position, phrase) VALUES (?1, ?2)",
                params![position as i64, phrase],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
