//! Caching layer for cpfm-core
//!
//! The cache is an optimization, never a dependency: every backend error
//! is logged by the caller and the value recomputed.
//!
//! Backends:
//! - [`MokaCacheStore`]: process-local, per-entry TTL
//! - [`SqliteCacheStore`]: file-backed, shared across CLI invocations
//! - [`NullCacheStore`]: caching disabled

pub mod invalidator;
pub mod memory;
pub mod null;
pub mod sqlite_cache;

pub use invalidator::CacheInvalidator;
pub use memory::MokaCacheStore;
pub use null::NullCacheStore;
pub use sqlite_cache::SqliteCacheStore;

use crate::config::{CacheBackend, CacheConfig};
use crate::error::Result;
use crate::store::fold_plugin_name;
use cpfm_types::InsightSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Bump when the layout of a cached value changes
pub const KEY_VERSION: u32 = 1;

/// Values the engine caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEntry {
    Insights(InsightSet),
    PluginNames(Arc<Vec<String>>),
}

/// Key/value store with per-entry expiry
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    fn set(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<()>;

    fn invalidate(&self, key: &str) -> Result<()>;

    fn invalidate_all(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

/// Key of the insight set for a plugin filter (`None` = all plugins)
///
/// The filter is folded with [`fold_plugin_name`], the same comparison the
/// store applies; the `plugin=` prefix keeps it distinct from the sentinel.
pub fn insight_key(plugin_filter: Option<&str>) -> String {
    match plugin_filter.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("insights:v{}:plugin={}", KEY_VERSION, fold_plugin_name(name)),
        None => format!("insights:v{}:all", KEY_VERSION),
    }
}

pub fn plugin_names_key() -> String {
    format!("plugin-names:v{}", KEY_VERSION)
}

/// Build the backend selected in configuration
pub fn build_cache(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    let cache: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Memory => Arc::new(MokaCacheStore::new(config.max_entries)),
        CacheBackend::Sqlite => Arc::new(SqliteCacheStore::new(&config.dir)?),
        CacheBackend::Disabled => Arc::new(NullCacheStore),
    };
    tracing::debug!(backend = cache.backend_name(), "Cache backend ready");
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_keys_are_normalized() {
        assert_eq!(insight_key(None), insight_key(Some("   ")));
        assert_eq!(
            insight_key(Some(" Cool Timeline ")),
            insight_key(Some("cool timeline"))
        );
        assert_ne!(insight_key(Some("all")), insight_key(None));
        assert_ne!(insight_key(Some("Cool Timeline")), insight_key(Some("Cool-Timeline")));
        assert_eq!(
            insight_key(Some("Événements Pro")),
            insight_key(Some("événements pro"))
        );
    }

    #[test]
    fn test_build_disabled_backend() {
        let config = CacheConfig {
            backend: CacheBackend::Disabled,
            ..Default::default()
        };
        let cache = build_cache(&config).unwrap();
        assert_eq!(cache.backend_name(), "disabled");
    }
}
