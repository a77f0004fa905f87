//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::key::{prepare_put, vary_matches, RequestKey, VaryValue};
use super::traits::{CachedResponse, StoredEntry};
use crate::http::{Headers, Method, Request, Response, ResponseType};

/// Trait for named-cache storage backends.
///
/// A backend holds any number of named caches. Each cache maps request
/// identity to a response snapshot; writing to a cache that does not exist
/// creates it.
pub trait CacheStorage: Send + Sync {
  /// Open the named cache, creating it if absent.
  fn open(&self, cache_name: &str) -> Result<()>;

  /// Find the stored response for a request in one cache.
  fn match_request(&self, cache_name: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Store a single response (last writer wins).
  fn put(&self, cache_name: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store several responses; either all of them are written or none is.
  fn put_all(&self, cache_name: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Names of all caches, in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a cache and its entries. Returns false if it did not exist.
  fn delete(&self, cache_name: &str) -> Result<bool>;

  /// Request identities stored in one cache.
  fn entries(&self, cache_name: &str) -> Result<Vec<RequestKey>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the storage at a specific path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

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

    Ok(data_dir.join("book-club-offline").join("caches.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named caches, in creation order
CREATE TABLE IF NOT EXISTS caches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    vary TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    response_type TEXT NOT NULL,
    final_url TEXT,
    redirected INTEGER NOT NULL DEFAULT 0,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_key),
    FOREIGN KEY (cache_name) REFERENCES caches(name) ON DELETE CASCADE
);
"#;

fn ensure_cache(conn: &Connection, cache_name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  cache_name: &str,
  request: &Request,
  response: &Response,
) -> Result<()> {
  let vary = prepare_put(request, response)?;
  let key = RequestKey::for_request(request);

  let vary_json =
    serde_json::to_string(&vary).map_err(|e| eyre!("Failed to serialize vary: {}", e))?;
  let headers_json = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (cache_name, request_key, method, url, vary, status, status_text, headers, body,
          response_type, final_url, redirected, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache_name,
        key.hash,
        key.method.as_str(),
        key.url,
        vary_json,
        response.status,
        response.status_text,
        headers_json,
        response.body,
        response.response_type.as_str(),
        response.url,
        response.redirected,
      ],
    )
    .map_err(|e| eyre!("Failed to store response for {}: {}", key.url, e))?;

  Ok(())
}

/// Raw column values of a `cache_entries` row.
struct EntryRow {
  request_key: String,
  method: String,
  url: String,
  vary: String,
  status: u16,
  status_text: String,
  headers: String,
  body: Vec<u8>,
  response_type: String,
  final_url: Option<String>,
  redirected: bool,
  cached_at: String,
}

const ENTRY_COLUMNS: &str = "request_key, method, url, vary, status, status_text, headers, body, \
                             response_type, final_url, redirected, cached_at";

impl EntryRow {
  fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      request_key: row.get(0)?,
      method: row.get(1)?,
      url: row.get(2)?,
      vary: row.get(3)?,
      status: row.get(4)?,
      status_text: row.get(5)?,
      headers: row.get(6)?,
      body: row.get(7)?,
      response_type: row.get(8)?,
      final_url: row.get(9)?,
      redirected: row.get(10)?,
      cached_at: row.get(11)?,
    })
  }

  fn into_entry(self) -> Result<StoredEntry> {
    let vary: Vec<VaryValue> =
      serde_json::from_str(&self.vary).map_err(|e| eyre!("Failed to parse vary: {}", e))?;
    let headers: Headers =
      serde_json::from_str(&self.headers).map_err(|e| eyre!("Failed to parse headers: {}", e))?;
    let response_type = ResponseType::parse(&self.response_type)
      .ok_or_else(|| eyre!("Unknown response type '{}'", self.response_type))?;

    Ok(StoredEntry {
      key: RequestKey {
        hash: self.request_key,
        method: Method::parse(&self.method),
        url: self.url,
      },
      vary,
      response: Response {
        status: self.status,
        status_text: self.status_text,
        headers,
        body: self.body,
        response_type,
        url: self.final_url,
        redirected: self.redirected,
      },
      cached_at: parse_datetime(&self.cached_at)?,
    })
  }
}

impl CacheStorage for SqliteStorage {
  fn open(&self, cache_name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    ensure_cache(&conn, cache_name)
  }

  fn match_request(&self, cache_name: &str, request: &Request) -> Result<Option<CachedResponse>> {
    if request.method != Method::Get {
      return Ok(None);
    }

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let key = RequestKey::for_request(request);

    let row = conn
      .query_row(
        &format!(
          "SELECT {} FROM cache_entries WHERE cache_name = ? AND request_key = ?",
          ENTRY_COLUMNS
        ),
        params![cache_name, key.hash],
        EntryRow::from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache {}: {}", cache_name, e))?;

    match row {
      Some(row) => {
        let entry = row.into_entry()?;
        if vary_matches(&entry.vary, request) {
          Ok(Some(entry.to_cached()))
        } else {
          Ok(None)
        }
      }
      None => Ok(None),
    }
  }

  fn put(&self, cache_name: &str, request: &Request, response: &Response) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    ensure_cache(&tx, cache_name)?;
    insert_entry(&tx, cache_name, request, response)?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn put_all(&self, cache_name: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Dropping the transaction on error rolls every write back
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    ensure_cache(&tx, cache_name)?;
    for (request, response) in entries {
      insert_entry(&tx, cache_name, request, response)?;
    }
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", cache_name, e))?;
    let deleted = tx
      .execute("DELETE FROM caches WHERE name = ?", params![cache_name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache_name, e))?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(deleted > 0)
  }

  fn entries(&self, cache_name: &str) -> Result<Vec<RequestKey>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT request_key, method, url FROM cache_entries
         WHERE cache_name = ?
         ORDER BY rowid",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![cache_name], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list entries of {}: {}", cache_name, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    Ok(
      rows
        .into_iter()
        .map(|(hash, method, url)| RequestKey {
          hash,
          method: Method::parse(&method),
          url,
        })
        .collect(),
    )
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
