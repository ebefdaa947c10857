//! Concurrent cache misses on one key
//!
//! With single-flight every thread but one waits and then reads the cached
//! set; without it each thread may scan, but all of them must agree.

use chrono::{NaiveDate, NaiveDateTime};
use cpfm_core::analytics::{FetchSource, InsightAggregator};
use cpfm_core::cache::{MokaCacheStore, SqliteCacheStore};
use cpfm_core::config::{CacheConfig, ScanConfig};
use cpfm_core::store::{StatusRow, TelemetryRow};
use cpfm_core::{CacheStore, FeedbackFilter, Result, RowStore, SqliteRowStore, TelemetryFilter};
use cpfm_types::{FeedbackRecord, SiteTelemetryRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const THREADS: usize = 8;

/// Store that counts full scans and slows each batch down
struct SlowStore {
    inner: SqliteRowStore,
    scans: AtomicUsize,
}

impl RowStore for SlowStore {
    fn telemetry_batch(
        &self,
        filter: &TelemetryFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TelemetryRow>> {
        if offset == 0 {
            self.scans.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(5));
        self.inner.telemetry_batch(filter, offset, limit)
    }

    fn status_rows(&self, filter: &TelemetryFilter) -> Result<Vec<StatusRow>> {
        self.inner.status_rows(filter)
    }

    fn daily_counts(&self, filter: &TelemetryFilter, days: usize) -> Result<Vec<(NaiveDate, u64)>> {
        self.inner.daily_counts(filter, days)
    }

    fn plugin_counts(&self, filter: &TelemetryFilter, limit: usize) -> Result<Vec<(String, u64)>> {
        self.inner.plugin_counts(filter, limit)
    }

    fn plugin_names(&self) -> Result<Vec<String>> {
        self.inner.plugin_names()
    }

    fn query_feedback(&self, filter: &FeedbackFilter) -> Result<Vec<FeedbackRecord>> {
        self.inner.query_feedback(filter)
    }
}

fn updated(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

fn slow_store(sites: usize) -> Arc<SlowStore> {
    let store = SqliteRowStore::open_in_memory().unwrap();
    let rows: Vec<_> = (0..sites)
        .map(|i| SiteTelemetryRecord {
            site_id: format!("site-{:04}", i),
            plugin_name: "Cool Timeline".to_string(),
            plugin_version: "2.0".to_string(),
            plugin_initial: String::new(),
            domain: String::new(),
            email: None,
            server_info: Some(r#"{"wp_version":"6.5","php_version":"8.2"}"#.to_string()),
            extra_details: Some(r#"{"active_plugins":[{"name":"Elementor"}]}"#.to_string()),
            created_date: None,
            update_date: updated(1 + (i % 28) as u32),
        })
        .collect();
    store.import_telemetry(&rows).unwrap();

    Arc::new(SlowStore {
        inner: store,
        scans: AtomicUsize::new(0),
    })
}

fn aggregator(store: Arc<SlowStore>, cache: Arc<dyn CacheStore>, single_flight: bool) -> InsightAggregator {
    let config = CacheConfig {
        single_flight,
        ..CacheConfig::default()
    };
    InsightAggregator::new(
        store,
        cache,
        ScanConfig {
            batch_size: 10,
            max_rows: 0,
        },
        &config,
    )
}

fn race(aggregator: &InsightAggregator) -> Vec<(FetchSource, usize, bool)> {
    let cancel = CancellationToken::new();
    thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    let fetched = aggregator
                        .fetch_insight_records(Some("Cool Timeline"), &cancel)
                        .unwrap();
                    (fetched.source, fetched.value.len(), fetched.value.truncated)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn test_single_flight_scans_once() {
    let store = slow_store(40);
    let aggregator = aggregator(store.clone(), Arc::new(MokaCacheStore::new(16)), true);

    let results = race(&aggregator);

    assert_eq!(store.scans.load(Ordering::SeqCst), 1);
    assert_eq!(aggregator.pending_guards(), 0);
    assert!(results.iter().all(|(_, len, truncated)| *len == 40 && !truncated));
    assert_eq!(
        results
            .iter()
            .filter(|(source, _, _)| *source == FetchSource::Scan)
            .count(),
        1
    );
}

#[test]
fn test_concurrent_misses_without_single_flight_agree() {
    let store = slow_store(40);
    let aggregator = aggregator(store.clone(), Arc::new(MokaCacheStore::new(16)), false);

    let results = race(&aggregator);

    let scans = store.scans.load(Ordering::SeqCst);
    assert!((1..=THREADS).contains(&scans));
    assert!(results.iter().all(|(_, len, _)| *len == 40));

    // Whatever won the race, the next read is a hit with the same content
    let cached = aggregator
        .fetch_insight_records(Some("Cool Timeline"), &CancellationToken::new())
        .unwrap();
    assert_eq!(cached.source, FetchSource::Cache);
    assert_eq!(cached.value.len(), 40);
}

#[test]
fn test_single_flight_over_sqlite_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = slow_store(25);
    let cache = Arc::new(SqliteCacheStore::new(dir.path()).unwrap());
    let aggregator = aggregator(store.clone(), cache, true);

    let results = race(&aggregator);

    assert_eq!(store.scans.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|(_, len, _)| *len == 25));
}
