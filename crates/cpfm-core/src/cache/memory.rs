//! In-memory cache backend using moka
//!
//! Each entry carries its own TTL (insight sets and the plugin catalogue
//! expire on different schedules), applied through a moka `Expiry`.

use super::{CacheEntry, CacheStore};
use crate::error::Result;
use moka::sync::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct Timed {
    entry: CacheEntry,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Timed> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Timed, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Timed,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Process-local cache (thread-safe, cheap to clone)
#[derive(Clone)]
pub struct MokaCacheStore {
    cache: Cache<String, Timed>,
}

impl std::fmt::Debug for MokaCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCacheStore")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MokaCacheStore {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Entries currently held (after pending maintenance)
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl CacheStore for MokaCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let hit = self.cache.get(key).map(|timed| timed.entry);
        debug!(key, hit = hit.is_some(), "Cache lookup (moka)");
        Ok(hit)
    }

    fn set(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<()> {
        self.cache.insert(key.to_string(), Timed { entry, ttl });
        debug!(key, ttl_secs = ttl.as_secs(), "Cache set (moka)");
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key);
        Ok(())
    }

    fn invalidate_all(&self) -> Result<()> {
        self.cache.invalidate_all();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn names(list: &[&str]) -> CacheEntry {
        CacheEntry::PluginNames(Arc::new(list.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn test_set_get_invalidate() {
        let cache = MokaCacheStore::new(16);
        assert_eq!(cache.get("k").unwrap(), None);

        cache.set("k", names(&["a"]), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(names(&["a"])));

        cache.invalidate("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_per_entry_ttl() {
        let cache = MokaCacheStore::new(16);
        cache
            .set("short", names(&["a"]), Duration::from_millis(30))
            .unwrap();
        cache
            .set("long", names(&["b"]), Duration::from_secs(60))
            .unwrap();

        std::thread::sleep(Duration::from_millis(80));

        assert_eq!(cache.get("short").unwrap(), None);
        assert!(cache.get("long").unwrap().is_some());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = MokaCacheStore::new(16);
        cache.set("a", names(&["a"]), Duration::from_secs(60)).unwrap();
        cache.set("b", names(&["b"]), Duration::from_secs(60)).unwrap();
        cache.invalidate_all().unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
        assert_eq!(cache.entry_count(), 0);
    }
}
