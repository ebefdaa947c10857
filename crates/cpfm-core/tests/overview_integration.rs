//! Integration tests for the overview engine over a seeded SQLite store
//!
//! Fixture: 100 sites across three plugins with known deactivation counts.
//!
//! | plugin          | sites | deactivated |
//! |-----------------|-------|-------------|
//! | Cool Timeline   | 50    | 10          |
//! | Events Calendar | 30    | 15          |
//! | Timeline Widget | 20    | 0           |

use chrono::{NaiveDate, NaiveDateTime};
use cpfm_core::cache::{MokaCacheStore, NullCacheStore};
use cpfm_core::{
    CoreConfig, CoreError, EventBus, OverviewEngine, OverviewParams, OverviewRequest,
    SqliteRowStore, TopPluginsQuery,
};
use cpfm_types::{DateRange, NewFeedback, SiteTelemetryRecord, StatusSort, TopLimit};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PLUGINS: [(&str, usize, usize); 3] = [
    ("Cool Timeline", 50, 10),
    ("Events Calendar", 30, 15),
    ("Timeline Widget", 20, 0),
];

fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn telemetry(plugin: &str, i: usize) -> SiteTelemetryRecord {
    let slug = plugin.to_lowercase().replace(' ', "-");
    // Timeline Widget sites report through the legacy PHP-serialized format
    let server_info = if plugin == "Timeline Widget" {
        r#"a:2:{s:10:"wp_version";s:3:"6.4";s:11:"php_version";s:3:"8.1";}"#.to_string()
    } else {
        r#"{"wp_version":"6.5","php_version":"8.2"}"#.to_string()
    };

    SiteTelemetryRecord {
        site_id: format!("{}-{:03}", slug, i),
        plugin_name: plugin.to_string(),
        plugin_version: format!("2.{}", i % 2),
        plugin_initial: String::new(),
        domain: format!("{}-{}.example", slug, i),
        email: None,
        server_info: Some(server_info),
        extra_details: Some(format!(
            r#"{{"wp_theme":{{"name":"Astra"}},"active_plugins":[{{"name":"Elementor"}},{{"name":"{}"}}]}}"#,
            plugin
        )),
        created_date: None,
        update_date: ts(2024, 1, 1 + (i % 10) as u32),
    }
}

fn feedback(plugin: &str, site_id: &str, at: NaiveDateTime) -> NewFeedback {
    NewFeedback {
        plugin_name: plugin.to_string(),
        plugin_version: "2.0".to_string(),
        plugin_initial: String::new(),
        reason: "temporary".to_string(),
        review: String::new(),
        domain: String::new(),
        email: None,
        extra_details: None,
        server_info: None,
        deactivation_date: at,
        site_id: Some(site_id.to_string()),
    }
}

fn seed(store: &SqliteRowStore) {
    let mut rows = Vec::new();
    for (plugin, sites, _) in PLUGINS {
        rows.extend((0..sites).map(|i| telemetry(plugin, i)));
    }
    store.import_telemetry(&rows).unwrap();

    for (plugin, _, deactivated) in PLUGINS {
        for i in 0..deactivated {
            let site = telemetry(plugin, i).site_id;
            store
                .insert_feedback(&feedback(plugin, &site, ts(2024, 2, 1)))
                .unwrap();
        }
    }

    // Second feedback row for one site must not double count it
    let site = telemetry("Cool Timeline", 0).site_id;
    store
        .insert_feedback(&feedback("Cool Timeline", &site, ts(2024, 2, 2)))
        .unwrap();

    // Feedback older than the last heartbeat: the site was reactivated
    let site = telemetry("Cool Timeline", 10).site_id;
    store
        .insert_feedback(&feedback("Cool Timeline", &site, ts(2023, 12, 1)))
        .unwrap();
}

fn engine() -> OverviewEngine {
    let store = SqliteRowStore::open_in_memory().unwrap();
    seed(&store);
    OverviewEngine::new(
        Arc::new(store),
        Arc::new(MokaCacheStore::new(16)),
        CoreConfig::default(),
    )
}

#[test]
fn test_unfiltered_overview() {
    let engine = engine();
    let result = engine
        .build_overview(&OverviewRequest::default(), &CancellationToken::new())
        .unwrap();

    assert_eq!(result.stats.total, 100);
    assert_eq!(result.stats.deactivated, 25);
    assert_eq!(result.stats.activated, 75);
    assert_eq!(result.filter_name, None);
    assert!(!result.truncated);
    assert!(result.warnings.is_empty());

    assert_eq!(result.date_chart.labels.len(), 10);
    assert_eq!(result.date_chart.labels[0], "Jan 1");
    assert_eq!(result.date_chart.dates[9], "2024-01-10");
    assert!(result.date_chart.data.iter().all(|&n| n == 10));

    assert_eq!(
        result.plugin_chart.labels,
        vec!["Cool Timeline", "Events Calendar", "Timeline Widget"]
    );
    assert_eq!(result.plugin_chart.data, vec![50, 30, 20]);

    let names: Vec<_> = result
        .top_plugins
        .iter()
        .map(|p| p.plugin_name.as_str())
        .collect();
    assert_eq!(names, vec!["Cool Timeline", "Events Calendar", "Timeline Widget"]);
    assert_eq!(result.top_plugins[1].activation_rate, 50.0);

    let insights = &result.insights;
    assert_eq!(insights.total_sites, 100);
    assert!(insights.versions.is_empty());
    assert_eq!(insights.wp_versions[0].label, "6.5");
    assert_eq!(insights.wp_versions[0].count, 80);
    assert_eq!(insights.wp_versions[1].label, "6.4");
    assert_eq!(insights.wp_versions[1].count, 20);
    assert_eq!(insights.themes[0].count, 100);
    assert_eq!(insights.active_plugins[0].label, "Elementor");
    assert_eq!(insights.active_plugins[0].count, 100);
}

#[test]
fn test_plugin_filtered_overview() {
    let engine = engine();
    let request = OverviewRequest::from_params(&OverviewParams {
        plugin: Some(" cool timeline ".to_string()),
        status_sort: Some("deactivated".to_string()),
        ..Default::default()
    });
    let result = engine
        .build_overview(&request, &CancellationToken::new())
        .unwrap();

    assert_eq!(result.stats.total, 50);
    assert_eq!(result.stats.deactivated, 10);
    assert_eq!(result.stats.activated, 40);

    let names: Vec<_> = result
        .top_plugins
        .iter()
        .map(|p| p.plugin_name.as_str())
        .collect();
    assert_eq!(names, vec!["Events Calendar", "Timeline Widget"]);

    let insights = &result.insights;
    assert_eq!(insights.total_sites, 50);
    assert_eq!(insights.versions.len(), 2);
    assert_eq!(insights.versions[0].count, 25);
    let companions: Vec<_> = insights
        .active_plugins
        .iter()
        .map(|e| e.label.as_str())
        .collect();
    assert_eq!(companions, vec!["Elementor"]);
}

#[test]
fn test_date_range_overview() {
    let engine = engine();
    let range = DateRange::parse("2024-01-01", "2024-01-05").unwrap();
    let result = engine
        .build_overview(
            &OverviewRequest::default().with_range(range),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(result.stats.total, 50);
    assert_eq!(result.date_chart.labels.len(), 5);
    assert_eq!(result.insights.total_sites, 50);
    // Rankings ignore the date range and use the time window instead
    assert_eq!(result.top_plugins.len(), 3);
}

#[test]
fn test_top_plugins_limit_and_sort() {
    let engine = engine();
    let all = engine
        .top_plugins(&TopPluginsQuery {
            limit: TopLimit::All,
            sort: StatusSort::Activated,
            ..Default::default()
        })
        .unwrap();
    let names: Vec<_> = all.iter().map(|p| p.plugin_name.as_str()).collect();
    assert_eq!(names, vec!["Cool Timeline", "Timeline Widget", "Events Calendar"]);

    let one = engine
        .top_plugins(&TopPluginsQuery {
            limit: TopLimit::Count(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(one.len(), 1);
}

#[test]
fn test_plugin_names_catalogue() {
    let engine = engine();
    let names = engine.plugin_names().unwrap();
    assert_eq!(
        *names,
        vec![
            "Cool Timeline".to_string(),
            "Events Calendar".to_string(),
            "Timeline Widget".to_string(),
        ]
    );
}

#[test]
fn test_repeated_overview_is_idempotent() {
    let engine = engine();
    let cancel = CancellationToken::new();
    let request = OverviewRequest::for_plugin("Events Calendar");

    let first = engine.build_overview(&request, &cancel).unwrap();
    let second = engine.build_overview(&request, &cancel).unwrap();

    assert_eq!(first.stats, second.stats);
    assert_eq!(first.insights, second.insights);
    assert_eq!(first.top_plugins, second.top_plugins);
}

#[test]
fn test_cancelled_overview() {
    let engine = engine();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .build_overview(&OverviewRequest::default(), &cancel)
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled { .. }));
}

#[test]
fn test_write_invalidates_cached_insights() {
    let bus = EventBus::default_capacity();
    let store = SqliteRowStore::open_in_memory().unwrap();
    seed(&store);
    let store = Arc::new(store.with_events(bus.clone()));

    let engine = OverviewEngine::new(
        store.clone(),
        Arc::new(MokaCacheStore::new(16)),
        CoreConfig::default(),
    )
    .with_invalidation(&bus);
    let cancel = CancellationToken::new();

    let (before, _) = engine.insights(None, None, &cancel).unwrap();
    assert_eq!(before.value.total_sites, 100);

    store.upsert_telemetry(&telemetry("Timeline Widget", 99)).unwrap();

    let (after, _) = engine.insights(None, None, &cancel).unwrap();
    assert_eq!(after.value.total_sites, 101);
}

#[test]
fn test_without_invalidation_cache_serves_stale_value() {
    let store = SqliteRowStore::open_in_memory().unwrap();
    seed(&store);
    let store = Arc::new(store);

    let mut config = CoreConfig::default();
    config.cache.invalidate_on_write = false;
    let engine = OverviewEngine::new(store.clone(), Arc::new(MokaCacheStore::new(16)), config)
        .with_invalidation(&EventBus::default_capacity());
    let cancel = CancellationToken::new();

    engine.insights(None, None, &cancel).unwrap();
    store.upsert_telemetry(&telemetry("Timeline Widget", 99)).unwrap();
    let (stale, _) = engine.insights(None, None, &cancel).unwrap();
    assert_eq!(stale.value.total_sites, 100);

    engine.clear_cache().unwrap();
    let (fresh, _) = engine.insights(None, None, &cancel).unwrap();
    assert_eq!(fresh.value.total_sites, 101);
}

#[test]
fn test_disabled_cache_still_answers() {
    let store = SqliteRowStore::open_in_memory().unwrap();
    seed(&store);
    let engine = OverviewEngine::new(
        Arc::new(store),
        Arc::new(NullCacheStore),
        CoreConfig::default(),
    );

    let result = engine
        .build_overview(&OverviewRequest::default(), &CancellationToken::new())
        .unwrap();
    assert_eq!(result.stats.total, 100);
}

#[test]
fn test_non_ascii_plugin_filter_ignores_case_and_request_order() {
    let store = SqliteRowStore::open_in_memory().unwrap();
    let rows: Vec<_> = (0..2).map(|i| telemetry("Événements Pro", i)).collect();
    store.import_telemetry(&rows).unwrap();
    let engine = OverviewEngine::new(
        Arc::new(store),
        Arc::new(MokaCacheStore::new(16)),
        CoreConfig::default(),
    );
    let cancel = CancellationToken::new();

    let (lower, _) = engine
        .insights(Some("événements pro"), None, &cancel)
        .unwrap();
    let (exact, _) = engine
        .insights(Some("Événements Pro"), None, &cancel)
        .unwrap();

    assert_eq!(lower.value.total_sites, 2);
    assert_eq!(exact.value.total_sites, 2);
}

#[test]
fn test_site_moving_plugins_invalidates_previous_plugin() {
    let bus = EventBus::default_capacity();
    let store = SqliteRowStore::open_in_memory().unwrap();
    let rows: Vec<_> = (0..2).map(|i| telemetry("Cool Timeline", i)).collect();
    store.import_telemetry(&rows).unwrap();
    let store = Arc::new(store.with_events(bus.clone()));

    let engine = OverviewEngine::new(
        store.clone(),
        Arc::new(MokaCacheStore::new(16)),
        CoreConfig::default(),
    )
    .with_invalidation(&bus);
    let cancel = CancellationToken::new();

    let (before, _) = engine
        .insights(Some("Cool Timeline"), None, &cancel)
        .unwrap();
    assert_eq!(before.value.total_sites, 2);

    let mut moved = telemetry("Cool Timeline", 0);
    moved.plugin_name = "Elementor".to_string();
    store.upsert_telemetry(&moved).unwrap();

    let (after, _) = engine
        .insights(Some("Cool Timeline"), None, &cancel)
        .unwrap();
    assert_eq!(after.value.total_sites, 1);
}
