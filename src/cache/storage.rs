//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::entry::{CachedEntry, CachedResponse};
use super::key::{CacheKey, Variant};

/// Trait for cache storage backends.
///
/// Methods are blocking; [`super::CacheStore`] moves them off the async
/// executor.
pub trait CacheStorage: Send + Sync + 'static {
  /// Insert or replace the entry for `key` in `partition`, creating the
  /// partition if needed.
  fn put(&self, partition: &str, key: &CacheKey, response: &CachedResponse) -> Result<()>;

  /// Exact lookup within one partition.
  fn get(&self, partition: &str, key: &CacheKey) -> Result<Option<CachedEntry>>;

  /// Lookup by URL across all partitions, oldest partition first.
  ///
  /// Within a partition an entry stored under `preferred` wins, then one
  /// stored under the default variant, then the newest.
  fn match_url(&self, url: &str, preferred: &Variant) -> Result<Option<CachedEntry>>;

  /// Partition names in creation order.
  fn partitions(&self) -> Result<Vec<String>>;

  /// All entries of a partition, most recently written first.
  fn entries(&self, partition: &str) -> Result<Vec<CachedEntry>>;

  /// Remove a partition and everything in it. Returns false if it did not exist.
  fn delete_partition(&self, partition: &str) -> Result<bool>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
      }
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a store that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offline-proxy").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named partitions; rowid gives creation order for cross-partition matching
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One response per (partition, key)
CREATE TABLE IF NOT EXISTS entries (
    partition TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    variant TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_url ON entries(url);
"#;

const ENTRY_COLUMNS: &str =
  "e.partition, e.url, e.variant, e.status, e.status_text, e.headers, e.body, e.cached_at";

/// Raw row, decoded outside the rusqlite closure so JSON errors surface.
struct EntryRow {
  partition: String,
  url: String,
  variant: String,
  status: u16,
  status_text: String,
  headers: String,
  body: Vec<u8>,
  cached_at: String,
}

impl EntryRow {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      partition: row.get(0)?,
      url: row.get(1)?,
      variant: row.get(2)?,
      status: row.get(3)?,
      status_text: row.get(4)?,
      headers: row.get(5)?,
      body: row.get(6)?,
      cached_at: row.get(7)?,
    })
  }

  fn into_entry(self) -> Result<CachedEntry> {
    let headers: Vec<(String, Vec<u8>)> = serde_json::from_str(&self.headers)
      .map_err(|e| eyre!("Failed to decode cached headers for {}: {}", self.url, e))?;

    Ok(CachedEntry {
      partition: self.partition,
      key: CacheKey::from_parts(self.url, Variant::from_stored(self.variant)),
      response: CachedResponse {
        status: self.status,
        status_text: self.status_text,
        headers,
        body: self.body.into(),
      },
      cached_at: parse_datetime(&self.cached_at)?,
    })
  }
}

impl CacheStorage for SqliteStorage {
  fn put(&self, partition: &str, key: &CacheKey, response: &CachedResponse) -> Result<()> {
    let conn = self.lock()?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to create partition {}: {}", partition, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries
           (partition, key_hash, url, variant, status, status_text, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          partition,
          key.storage_hash(),
          key.url(),
          key.variant().as_str(),
          response.status,
          response.status_text,
          headers,
          &response.body[..],
        ],
      )
      .map_err(|e| eyre!("Failed to store {} in {}: {}", key, partition, e))?;

    Ok(())
  }

  fn get(&self, partition: &str, key: &CacheKey) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;
    let sql = format!(
      "SELECT {} FROM entries e WHERE e.partition = ? AND e.key_hash = ?",
      ENTRY_COLUMNS
    );

    let row = conn
      .query_row(&sql, params![partition, key.storage_hash()], EntryRow::from_row)
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", key, partition, e))?;

    row.map(EntryRow::into_entry).transpose()
  }

  fn match_url(&self, url: &str, preferred: &Variant) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;
    let sql = format!(
      "SELECT {} FROM entries e
       INNER JOIN partitions p ON p.name = e.partition
       WHERE e.url = ?
       ORDER BY p.rowid, (e.variant = ?) DESC, (e.variant = '') DESC, e.cached_at DESC
       LIMIT 1",
      ENTRY_COLUMNS
    );

    let row = conn
      .query_row(&sql, params![url, preferred.as_str()], EntryRow::from_row)
      .optional()
      .map_err(|e| eyre!("Failed to match {}: {}", url, e))?;

    row.map(EntryRow::into_entry).transpose()
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition name: {}", e))?;

    Ok(names)
  }

  fn entries(&self, partition: &str) -> Result<Vec<CachedEntry>> {
    let conn = self.lock()?;
    let sql = format!(
      "SELECT {} FROM entries e WHERE e.partition = ? ORDER BY e.cached_at DESC, e.url",
      ENTRY_COLUMNS
    );
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let rows = stmt
      .query_map(params![partition], EntryRow::from_row)
      .map_err(|e| eyre!("Failed to query entries of {}: {}", partition, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read entry of {}: {}", partition, e))?;

    rows.into_iter().map(EntryRow::into_entry).collect()
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE partition = ?", params![partition])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", partition, e))?;
    let removed = tx
      .execute("DELETE FROM partitions WHERE name = ?", params![partition])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", partition, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
