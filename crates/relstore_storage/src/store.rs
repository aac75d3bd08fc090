//! The EAV channel store.

use crate::channel::Channel;
use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::param::SqlParam;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Name of the table that remembers deletions awaiting synchronization.
pub const TOMBSTONE_TABLE: &str = "_relstore_tombstones";

/// One `(fieldName, fieldValue)` row of a record. `None` is an explicit NULL.
pub type FieldRow = (String, Option<String>);

/// Where a store lives.
///
/// A location can be reopened by another connection, which is how
/// background workers get a handle of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A database file.
    File(PathBuf),
    /// A named shared-cache in-memory database.
    Memory(String),
}

impl StoreLocation {
    /// Allocates a fresh, uniquely named in-memory location.
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(format!(
            "file:relstore-{}?mode=memory&cache=shared",
            Uuid::new_v4().simple()
        ))
    }

    /// Opens a new connection to this location.
    pub fn connect(&self, config: &StoreConfig) -> StorageResult<Connection> {
        let conn = match self {
            Self::File(path) => {
                if !config.create_if_missing && !path.exists() {
                    return Err(StorageError::NotFound {
                        path: path.display().to_string(),
                    });
                }
                let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                if config.create_if_missing {
                    flags |= OpenFlags::SQLITE_OPEN_CREATE;
                }
                Connection::open_with_flags(path, flags)?
            }
            Self::Memory(uri) => Connection::open_with_flags(
                uri,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
        };
        conn.busy_timeout(config.busy_timeout)?;
        Ok(conn)
    }
}

/// An entity-attribute-value store with one table per channel.
///
/// Every channel table holds `(record_id, name, value)` rows, one row per
/// field per record, with every value stored as text. The store knows
/// nothing about entity metadata: it reads and writes row sets, runs
/// compiled statements and scopes transactions.
///
/// # Transactions
///
/// [`begin`](Self::begin), [`commit`](Self::commit) and
/// [`rollback`](Self::rollback) keep a depth counter so nested scopes join
/// the outermost transaction. Only the outermost commit reaches SQLite. A
/// rollback in a nested scope poisons the transaction and the outermost
/// commit then rolls back instead.
///
/// # Example
///
/// ```rust
/// use relstore_storage::{Channel, EavStore};
///
/// let store = EavStore::open_in_memory().unwrap();
/// let people = Channel::new("people").unwrap();
/// store.ensure_channel(&people).unwrap();
/// store
///     .write_fields(&people, "p1", &[("name".to_string(), Some("Alice".to_string()))])
///     .unwrap();
/// let row = store.read_record(&people, "p1").unwrap();
/// assert_eq!(row["name"].as_deref(), Some("Alice"));
/// ```
pub struct EavStore {
    conn: Connection,
    location: StoreLocation,
    config: StoreConfig,
    depth: Cell<u32>,
    poisoned: Cell<bool>,
}

impl EavStore {
    /// Opens (or creates) a file-backed store.
    pub fn open(path: &Path, config: StoreConfig) -> StorageResult<Self> {
        Self::open_location(StoreLocation::File(path.to_path_buf()), config)
    }

    /// Opens a fresh in-memory store.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open_location(StoreLocation::memory(), StoreConfig::default())
    }

    /// Opens a store at an explicit location.
    pub fn open_location(location: StoreLocation, config: StoreConfig) -> StorageResult<Self> {
        let conn = location.connect(&config)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {TOMBSTONE_TABLE} (
                channel TEXT NOT NULL,
                record_id TEXT NOT NULL,
                deleted_at TEXT NOT NULL,
                PRIMARY KEY (channel, record_id)
            );"
        ))?;
        debug!(?location, "opened store");
        Ok(Self {
            conn,
            location,
            config,
            depth: Cell::new(0),
            poisoned: Cell::new(false),
        })
    }

    /// Returns where this store lives.
    #[must_use]
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Creates the channel table and its reverse-lookup index if missing.
    pub fn ensure_channel(&self, channel: &Channel) -> StorageResult<()> {
        let table = channel.quoted();
        let index = format!("\"{}_name_value\"", channel.as_str());
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                record_id TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT,
                PRIMARY KEY (record_id, name)
            );
            CREATE INDEX IF NOT EXISTS {index} ON {table} (name, value);"
        ))?;
        Ok(())
    }

    /// Lists the channel tables present in the database.
    pub fn channels(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite%' AND name NOT LIKE '\\_relstore%' ESCAPE '\\'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    // ========================================================================
    // Row sets
    // ========================================================================

    /// Reads every row stored for `id`.
    ///
    /// An empty map means the record does not exist.
    pub fn read_record(
        &self,
        channel: &Channel,
        id: &str,
    ) -> StorageResult<BTreeMap<String, Option<String>>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT name, value FROM {} WHERE record_id = ?1",
            channel.quoted()
        ))?;
        let rows = stmt
            .query_map([id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// Returns true if any row exists for `id`.
    pub fn record_exists(&self, channel: &Channel, id: &str) -> StorageResult<bool> {
        let found = self
            .conn
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE record_id = ?1 LIMIT 1",
                    channel.quoted()
                ),
                [id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Upserts rows for `id`. A `None` value stores an explicit NULL.
    pub fn write_fields(
        &self,
        channel: &Channel,
        id: &str,
        rows: &[FieldRow],
    ) -> StorageResult<usize> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO {} (record_id, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (record_id, name) DO UPDATE SET value = excluded.value",
            channel.quoted()
        ))?;
        for (name, value) in rows {
            stmt.execute(params![id, name, value])?;
        }
        Ok(rows.len())
    }

    /// Removes the whole row set of `id`, returning the number of rows removed.
    pub fn delete_record(&self, channel: &Channel, id: &str) -> StorageResult<usize> {
        let removed = self.conn.execute(
            &format!("DELETE FROM {} WHERE record_id = ?1", channel.quoted()),
            [id],
        )?;
        Ok(removed)
    }

    /// Lists record ids in a channel, ordered by id.
    pub fn record_ids(&self, channel: &Channel) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT record_id FROM {} ORDER BY record_id",
            channel.quoted()
        ))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Counts distinct records in a channel.
    pub fn record_count(&self, channel: &Channel) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(DISTINCT record_id) FROM {}",
                channel.quoted()
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Counts rows in a channel.
    pub fn row_count(&self, channel: &Channel) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", channel.quoted()),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Returns the ids of records whose field `name` holds exactly `value`.
    pub fn ids_with_value(
        &self,
        channel: &Channel,
        name: &str,
        value: &str,
    ) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT record_id FROM {} WHERE name = ?1 AND value = ?2 ORDER BY record_id",
            channel.quoted()
        ))?;
        let ids = stmt
            .query_map([name, value], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Returns `(record_id, name)` for rows holding `value` whose name
    /// matches the GLOB pattern `name_glob`.
    pub fn rows_with_value(
        &self,
        channel: &Channel,
        value: &str,
        name_glob: &str,
    ) -> StorageResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT record_id, name FROM {} WHERE value = ?1 AND name GLOB ?2 ORDER BY record_id, name",
            channel.quoted()
        ))?;
        let rows = stmt
            .query_map([value, name_glob], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Runs a compiled statement and returns every column as text.
    pub fn query(&self, sql: &str, params: &[SqlParam]) -> StorageResult<Vec<Vec<Option<String>>>> {
        debug!(sql, params = params.len(), "query");
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                values.push(value_to_text(row.get::<_, Value>(i)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Opens a transaction scope.
    pub fn begin(&self) -> StorageResult<()> {
        if self.depth.get() == 0 {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.poisoned.set(false);
        }
        self.depth.set(self.depth.get() + 1);
        Ok(())
    }

    /// Closes a transaction scope, committing if it was the outermost one.
    pub fn commit(&self) -> StorageResult<()> {
        let depth = self.depth.get();
        if depth == 0 {
            return Err(StorageError::NoTransaction);
        }
        self.depth.set(depth - 1);
        if depth > 1 {
            return Ok(());
        }
        if self.poisoned.replace(false) {
            self.rollback_outermost();
            return Err(StorageError::commit_failed("a nested scope rolled back"));
        }
        if let Err(err) = self.conn.execute_batch("COMMIT") {
            warn!(%err, "commit failed, rolling back");
            self.rollback_outermost();
            return Err(StorageError::commit_failed(err.to_string()));
        }
        Ok(())
    }

    /// Closes a transaction scope, rolling back the whole transaction.
    pub fn rollback(&self) -> StorageResult<()> {
        let depth = self.depth.get();
        if depth == 0 {
            return Err(StorageError::NoTransaction);
        }
        self.depth.set(depth - 1);
        if depth > 1 {
            self.poisoned.set(true);
        } else {
            self.poisoned.set(false);
            self.rollback_outermost();
        }
        Ok(())
    }

    /// Returns true while a transaction scope is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.depth.get() > 0
    }

    /// Runs `f` inside a transaction scope.
    ///
    /// If `f` returns `Ok`, the scope is committed. If it returns `Err`,
    /// the scope is rolled back and the original error is returned.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StorageError>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                // Don't mask the original error
                if let Err(rollback_err) = self.rollback() {
                    warn!(%rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    fn rollback_outermost(&self) {
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            warn!(%err, "rollback failed");
        }
    }

    /// Installs a guard consulted before every commit.
    ///
    /// When the guard returns `false` SQLite turns the commit into a
    /// rollback and [`commit`](Self::commit) reports
    /// [`StorageError::CommitFailed`].
    pub fn set_commit_guard<F>(&self, guard: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let mut guard = guard;
        self.conn.commit_hook(Some(move || !guard()));
    }

    /// Removes a guard installed by [`set_commit_guard`](Self::set_commit_guard).
    pub fn clear_commit_guard(&self) {
        self.conn.commit_hook(None::<fn() -> bool>);
    }

    // ========================================================================
    // Tombstones
    // ========================================================================

    /// Remembers that `id` was deleted locally and must be deleted remotely.
    pub fn add_tombstone(&self, channel: &Channel, id: &str) -> StorageResult<()> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {TOMBSTONE_TABLE} (channel, record_id, deleted_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))"
            ),
            [channel.as_str(), id],
        )?;
        Ok(())
    }

    /// Lists the tombstoned ids of a channel.
    pub fn tombstones(&self, channel: &Channel) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT record_id FROM {TOMBSTONE_TABLE} WHERE channel = ?1 ORDER BY deleted_at, record_id"
        ))?;
        let ids = stmt
            .query_map([channel.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Forgets a tombstone. Returns true if one existed.
    pub fn clear_tombstone(&self, channel: &Channel, id: &str) -> StorageResult<bool> {
        let removed = self.conn.execute(
            &format!("DELETE FROM {TOMBSTONE_TABLE} WHERE channel = ?1 AND record_id = ?2"),
            [channel.as_str(), id],
        )?;
        Ok(removed > 0)
    }
}

impl std::fmt::Debug for EavStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EavStore")
            .field("location", &self.location)
            .field("depth", &self.depth.get())
            .finish_non_exhaustive()
    }
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(v) => Some(v.to_string()),
        Value::Real(v) => Some(v.to_string()),
        Value::Text(v) => Some(v),
        Value::Blob(v) => Some(String::from_utf8_lossy(&v).into_owned()),
    }
}
