//! SQLite cache for computed insight sets
//!
//! Lets consecutive CLI invocations share one scan result.
//!
//! Schema:
//! - cache_metadata: layout version
//! - cache_entries: bincode blob + absolute expiry (unix seconds)
//!
//! Invalidation:
//! - expired rows are dropped on read and on open
//! - write-path events delete affected keys
//! - a layout version mismatch clears everything on open
//!
//! Cache Version History:
//! - v1: Initial version (insight sets and plugin catalogue)

use super::{CacheEntry, CacheStore};
use crate::error::{CoreError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Increment when `CacheEntry` or anything inside it changes shape
const CACHE_VERSION: i32 = 1;

/// SQLite-based cache (thread-safe)
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
    cache_path: PathBuf,
}

fn cache_err(context: &str) -> impl FnOnce(rusqlite::Error) -> CoreError + '_ {
    move |e| CoreError::Cache {
        message: format!("{}: {}", context, e),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl SqliteCacheStore {
    /// Create or open the cache database in `cache_dir`
    pub fn new(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CoreError::Cache {
            message: format!("failed to create cache directory {}: {}", cache_dir.display(), e),
        })?;

        let cache_path = cache_dir.join("insight-cache.db");
        let conn = Connection::open(&cache_path).map_err(cache_err("open cache database"))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(cache_err("enable WAL mode"))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL,
                data BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_expires ON cache_entries(expires_at);
            "#,
        )
        .map_err(cache_err("create schema"))?;

        let stored_version: Option<i32> = conn
            .query_row(
                "SELECT value FROM cache_metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(cache_err("query cache version"))?;

        match stored_version {
            Some(v) if v != CACHE_VERSION => {
                warn!(
                    stored = v,
                    current = CACHE_VERSION,
                    "Cache version mismatch detected, clearing stale cache"
                );
                conn.execute("DELETE FROM cache_entries", [])
                    .map_err(cache_err("clear stale cache"))?;
                conn.execute(
                    "INSERT OR REPLACE INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .map_err(cache_err("update cache version"))?;
            }
            None => {
                conn.execute(
                    "INSERT INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .map_err(cache_err("initialize cache version"))?;
            }
            Some(_) => {}
        }

        let purged = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?",
                params![unix_now()],
            )
            .map_err(cache_err("purge expired entries"))?;

        debug!(path = %cache_path.display(), purged, "Insight cache initialized");

        Ok(Self {
            conn: Mutex::new(conn),
            cache_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    /// Number of stored (possibly expired) entries
    pub fn entry_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            .map_err(cache_err("count entries"))?;
        Ok(count as u64)
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock();

        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT data, expires_at FROM cache_entries WHERE key = ?",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(cache_err("query cache"))?;

        let Some((bytes, expires_at)) = row else {
            debug!(key, "Cache miss (sqlite)");
            return Ok(None);
        };

        if expires_at <= unix_now() {
            conn.execute("DELETE FROM cache_entries WHERE key = ?", params![key])
                .map_err(cache_err("drop expired entry"))?;
            debug!(key, "Cache entry expired (sqlite)");
            return Ok(None);
        }

        match bincode::deserialize::<CacheEntry>(&bytes) {
            Ok(entry) => {
                debug!(key, "Cache hit (sqlite)");
                Ok(Some(entry))
            }
            Err(e) => {
                warn!(key, error = %e, "Undecodable cache entry, dropping");
                conn.execute("DELETE FROM cache_entries WHERE key = ?", params![key])
                    .map_err(cache_err("drop undecodable entry"))?;
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<()> {
        let data = bincode::serialize(&entry).map_err(|source| CoreError::CacheEncode {
            key: key.to_string(),
            source,
        })?;
        let expires_at = unix_now().saturating_add(ttl.as_secs() as i64);

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, expires_at, data) VALUES (?, ?, ?)",
            params![key, expires_at, data],
        )
        .map_err(cache_err("store entry"))?;

        debug!(key, bytes = data.len(), "Cache set (sqlite)");
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM cache_entries WHERE key = ?", params![key])
            .map_err(cache_err("invalidate entry"))?;
        Ok(())
    }

    fn invalidate_all(&self) -> Result<()> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM cache_entries", [])
            .map_err(cache_err("clear cache"))?;
        debug!(removed, "Cache cleared (sqlite)");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cpfm_types::{CompactInsightRecord, InsightSet};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn sample_set() -> InsightSet {
        InsightSet {
            records: Arc::new(vec![CompactInsightRecord {
                site_id: "site-1".into(),
                update_date: NaiveDate::from_ymd_opt(2024, 1, 5)
                    .unwrap()
                    .and_hms_opt(10, 30, 0)
                    .unwrap(),
                plugin_version: Some("2.1.0".into()),
                wp_version: Some("6.4".into()),
                php_version: None,
                theme_name: Some("Astra".into()),
                active_plugins: vec!["Elementor".into()],
            }]),
            truncated: true,
            rows_scanned: 1,
            malformed_payloads: 0,
        }
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let dir = tempdir().unwrap();
        let entry = CacheEntry::Insights(sample_set());

        {
            let cache = SqliteCacheStore::new(dir.path()).unwrap();
            cache
                .set("insights:v1:all", entry.clone(), Duration::from_secs(600))
                .unwrap();
        }

        let reopened = SqliteCacheStore::new(dir.path()).unwrap();
        assert_eq!(reopened.get("insights:v1:all").unwrap(), Some(entry));
        assert_eq!(reopened.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_expired_entry_is_miss() {
        let dir = tempdir().unwrap();
        let cache = SqliteCacheStore::new(dir.path()).unwrap();
        cache
            .set("k", CacheEntry::Insights(sample_set()), Duration::ZERO)
            .unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        assert_eq!(cache.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_version_mismatch_clears_entries() {
        let dir = tempdir().unwrap();
        {
            let cache = SqliteCacheStore::new(dir.path()).unwrap();
            cache
                .set("k", CacheEntry::Insights(sample_set()), Duration::from_secs(600))
                .unwrap();
            let conn = cache.conn.lock();
            conn.execute(
                "UPDATE cache_metadata SET value = ? WHERE key = 'version'",
                params![CACHE_VERSION + 1],
            )
            .unwrap();
        }

        let reopened = SqliteCacheStore::new(dir.path()).unwrap();
        assert_eq!(reopened.get("k").unwrap(), None);
    }

    #[test]
    fn test_invalidate() {
        let dir = tempdir().unwrap();
        let cache = SqliteCacheStore::new(dir.path()).unwrap();
        let names = CacheEntry::PluginNames(Arc::new(vec!["Cool Timeline".into()]));
        cache.set("a", names.clone(), Duration::from_secs(600)).unwrap();
        cache.set("b", names, Duration::from_secs(600)).unwrap();

        cache.invalidate("a").unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
        assert!(cache.get("b").unwrap().is_some());

        cache.invalidate_all().unwrap();
        assert_eq!(cache.entry_count().unwrap(), 0);
    }
}
