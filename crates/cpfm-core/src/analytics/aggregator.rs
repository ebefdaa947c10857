//! Streaming insight aggregation
//!
//! Pages through telemetry in fixed-size batches, decodes both payload
//! blobs of every row and keeps only a [`CompactInsightRecord`]. The
//! compacted set is cached per plugin filter.
//!
//! Scan bounds:
//! - stops at the first short batch (end of data)
//! - stops at the row safety cap; a one-row lookahead past the cap decides
//!   whether the result is flagged `truncated`
//! - checks the cancellation token before every batch
//!
//! With single-flight enabled, concurrent misses on one key wait for the
//! first scan and then read its cached result. Without it every miss scans
//! and the last writer wins; all writers store the same value.

use crate::cache::{insight_key, plugin_names_key, CacheEntry, CacheStore};
use crate::config::{CacheConfig, ScanConfig};
use crate::error::{CoreError, Result};
use crate::parsers::{decode_extra_details, decode_server_info};
use crate::store::{RowStore, TelemetryFilter, TelemetryRow};
use cpfm_types::{CompactInsightRecord, InsightSet};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where a fetched value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Scan,
}

/// Fetched value plus locally recovered problems
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub source: FetchSource,
    pub warnings: Vec<String>,
}

/// Project one telemetry row, returning the number of unreadable blobs
pub fn compact_record(row: &TelemetryRow) -> (CompactInsightRecord, usize) {
    let (server, server_status) = decode_server_info(row.server_info.as_deref());
    let (extra, extra_status) = decode_extra_details(row.extra_details.as_deref());
    let malformed =
        usize::from(server_status.is_malformed()) + usize::from(extra_status.is_malformed());

    let theme_name = extra
        .server
        .theme_name()
        .or_else(|| server.theme_name())
        .map(|t| t.trim().to_string());

    let active_plugins = extra
        .active_plugin_names()
        .map(|name| name.trim().to_string())
        .collect();

    let plugin_version = Some(row.plugin_version.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let record = CompactInsightRecord {
        site_id: row.site_id.clone(),
        update_date: row.update_date,
        plugin_version,
        wp_version: server.wp_version.or(extra.server.wp_version),
        php_version: server.php_version.or(extra.server.php_version),
        theme_name,
        active_plugins,
    };
    (record, malformed)
}

/// Cached, batched producer of insight sets
pub struct InsightAggregator {
    store: Arc<dyn RowStore>,
    cache: Arc<dyn CacheStore>,
    scan: ScanConfig,
    insight_ttl: Duration,
    plugin_names_ttl: Duration,
    single_flight: bool,
    guards: DashMap<String, Arc<Mutex<()>>>,
}

impl InsightAggregator {
    pub fn new(
        store: Arc<dyn RowStore>,
        cache: Arc<dyn CacheStore>,
        scan: ScanConfig,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            cache,
            scan,
            insight_ttl: cache_config.insight_ttl(),
            plugin_names_ttl: cache_config.plugin_names_ttl(),
            single_flight: cache_config.single_flight,
            guards: DashMap::new(),
        }
    }

    /// Insight records for `plugin_filter` (`None` or blank = all plugins)
    pub fn fetch_insight_records(
        &self,
        plugin_filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Fetched<InsightSet>> {
        let key = insight_key(plugin_filter);
        let mut warnings = Vec::new();

        if let Some(set) = self.cached_insights(&key, &mut warnings) {
            return Ok(Fetched {
                value: set,
                source: FetchSource::Cache,
                warnings,
            });
        }

        let cache_readable = warnings.is_empty();
        if !self.single_flight {
            return self.scan_and_store(&key, plugin_filter, warnings, cancel);
        }

        let guard = self.guard(&key);
        let outcome = {
            let _held = guard.lock();
            // Another request may have filled the key while we waited
            let filled = if cache_readable {
                self.cached_insights(&key, &mut warnings)
            } else {
                None
            };
            match filled {
                Some(set) => Ok(Fetched {
                    value: set,
                    source: FetchSource::Cache,
                    warnings,
                }),
                None => self.scan_and_store(&key, plugin_filter, warnings, cancel),
            }
        };
        drop(guard);
        self.release_guard(&key);
        outcome
    }

    fn scan_and_store(
        &self,
        key: &str,
        plugin_filter: Option<&str>,
        mut warnings: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Fetched<InsightSet>> {
        let set = self.scan(plugin_filter, cancel)?;

        if let Err(e) = self
            .cache
            .set(key, CacheEntry::Insights(set.clone()), self.insight_ttl)
        {
            warn!(key, error = %e, "Failed to cache insight set");
            warnings.push(format!("insight cache write failed: {}", e));
        }

        Ok(Fetched {
            value: set,
            source: FetchSource::Scan,
            warnings,
        })
    }

    /// Distinct plugin names (cached catalogue)
    pub fn fetch_plugin_names(&self) -> Result<Fetched<Arc<Vec<String>>>> {
        let key = plugin_names_key();
        let mut warnings = Vec::new();

        match self.cache.get(&key) {
            Ok(Some(CacheEntry::PluginNames(names))) => {
                return Ok(Fetched {
                    value: names,
                    source: FetchSource::Cache,
                    warnings,
                })
            }
            Ok(Some(_)) => warn!(key = %key, "Unexpected cache entry type, recomputing"),
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, recomputing");
                warnings.push(format!("plugin name cache unavailable: {}", e));
            }
        }

        let names = Arc::new(self.store.plugin_names()?);
        if let Err(e) = self.cache.set(
            &key,
            CacheEntry::PluginNames(names.clone()),
            self.plugin_names_ttl,
        ) {
            warn!(key = %key, error = %e, "Failed to cache plugin names");
            warnings.push(format!("plugin name cache write failed: {}", e));
        }

        Ok(Fetched {
            value: names,
            source: FetchSource::Scan,
            warnings,
        })
    }

    fn guard(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(&self.guards.entry(key.to_string()).or_default())
    }

    /// Drop the key's guard once no other request holds or waits on it
    fn release_guard(&self, key: &str) {
        self.guards
            .remove_if(key, |_, guard| Arc::strong_count(guard) == 1);
    }

    /// Keys with a live single-flight guard
    pub fn pending_guards(&self) -> usize {
        self.guards.len()
    }

    fn cached_insights(&self, key: &str, warnings: &mut Vec<String>) -> Option<InsightSet> {
        match self.cache.get(key) {
            Ok(Some(CacheEntry::Insights(set))) => {
                debug!(key, records = set.len(), "Insight cache hit");
                Some(set)
            }
            Ok(Some(_)) => {
                warn!(key, "Unexpected cache entry type, recomputing");
                None
            }
            Ok(None) => {
                debug!(key, "Insight cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, recomputing");
                warnings.push(format!("insight cache unavailable: {}", e));
                None
            }
        }
    }

    /// Full batched scan, bypassing the cache
    pub fn scan(
        &self,
        plugin_filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<InsightSet> {
        let filter = TelemetryFilter::for_plugin(plugin_filter);
        let batch_size = self.scan.batch_size.max(1);
        let cap = self.scan.row_cap();

        let mut records = Vec::new();
        let mut scanned = 0usize;
        let mut malformed = 0usize;
        let mut truncated = false;

        loop {
            if cancel.is_cancelled() {
                info!(rows_scanned = scanned, "Insight scan cancelled");
                return Err(CoreError::Cancelled {
                    rows_scanned: scanned,
                });
            }

            let want = match cap {
                Some(cap) => batch_size.min(cap.saturating_sub(scanned)),
                None => batch_size,
            };

            if want == 0 {
                truncated = !self.store.telemetry_batch(&filter, scanned, 1)?.is_empty();
                break;
            }

            let rows = self.store.telemetry_batch(&filter, scanned, want)?;
            let fetched = rows.len();

            records.reserve(fetched);
            for row in &rows {
                let (record, bad) = compact_record(row);
                malformed += bad;
                records.push(record);
            }
            scanned += fetched;

            debug!(offset = scanned, batch = fetched, "Insight batch scanned");

            if fetched < want {
                break;
            }
        }

        if malformed > 0 {
            warn!(malformed, "Malformed payloads treated as empty");
        }
        if truncated {
            warn!(
                cap = cap.unwrap_or_default(),
                "Insight scan stopped at the row safety cap"
            );
        }
        info!(
            plugin = plugin_filter.unwrap_or("*"),
            rows = scanned,
            truncated,
            "Insight scan complete"
        );

        Ok(InsightSet {
            records: Arc::new(records),
            truncated,
            rows_scanned: scanned,
            malformed_payloads: malformed,
        })
    }
}
