//! Overview façade
//!
//! Answers one dashboard request: status totals, daily installations,
//! installations per plugin, the top-plugins table and the environment
//! distributions. Store failures propagate; everything else (bad filter
//! input, cache trouble, truncated scans) becomes a warning on the result.

use super::aggregator::{Fetched, InsightAggregator};
use super::classifier::tally;
use super::distributions::build_insights;
use super::ranker::{rank_top_plugins, TopPluginsQuery};
use super::timeseries::{build_date_chart, build_plugin_chart, PLUGIN_CHART_SIZE};
use crate::cache::{CacheInvalidator, CacheStore};
use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::event::EventBus;
use crate::store::{RowStore, TelemetryFilter};
use chrono::{Local, NaiveDateTime, Utc};
use cpfm_types::{
    DateRange, InsightSet, OverviewResult, PluginInsights, RankedPlugin, StatusSort, TimeWindow,
    TopLimit,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Raw request parameters as received from a front-end
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverviewParams {
    pub plugin: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub status_sort: Option<String>,
    pub time_window: Option<String>,
    pub limit: Option<String>,
}

/// Validated request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverviewRequest {
    pub plugin_filter: Option<String>,
    pub date_range: Option<DateRange>,
    pub status_sort: StatusSort,
    pub time_window: TimeWindow,
    /// `None` uses the configured default
    pub limit: Option<TopLimit>,
    /// Input problems replaced by defaults
    pub warnings: Vec<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl OverviewRequest {
    /// Parse leniently: every invalid value falls back to its default
    pub fn from_params(params: &OverviewParams) -> Self {
        let mut request = Self {
            plugin_filter: non_blank(&params.plugin).map(str::to_string),
            ..Default::default()
        };

        match (non_blank(&params.date_from), non_blank(&params.date_to)) {
            (Some(from), Some(to)) => match DateRange::parse(from, to) {
                Some(range) => request.date_range = Some(range),
                None => request.warn(format!(
                    "invalid date range '{}'..'{}' ignored (expected YYYY-MM-DD)",
                    from, to
                )),
            },
            (None, None) => {}
            _ => request.warn("date range ignored: both ends are required".to_string()),
        }

        if let Some(raw) = non_blank(&params.status_sort) {
            match StatusSort::parse(raw) {
                Some(sort) => request.status_sort = sort,
                None => request.warn(format!("unknown status sort '{}', using total", raw)),
            }
        }

        if let Some(raw) = non_blank(&params.time_window) {
            match TimeWindow::parse(raw) {
                Some(window) => request.time_window = window,
                None => request.warn(format!("unknown time window '{}', using all-time", raw)),
            }
        }

        if let Some(raw) = non_blank(&params.limit) {
            match raw.parse::<i64>().ok().and_then(TopLimit::from_i64) {
                Some(limit) => request.limit = Some(limit),
                None => request.warn(format!("invalid limit '{}', using default", raw)),
            }
        }

        request
    }

    pub fn for_plugin(plugin: &str) -> Self {
        Self {
            plugin_filter: Some(plugin.trim().to_string()).filter(|p| !p.is_empty()),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    fn warn(&mut self, message: String) {
        warn!(%message, "Invalid overview parameter");
        self.warnings.push(message);
    }
}

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Reporting engine over a row store and a cache
pub struct OverviewEngine {
    store: Arc<dyn RowStore>,
    cache: Arc<dyn CacheStore>,
    aggregator: InsightAggregator,
    config: CoreConfig,
    invalidator: Option<Mutex<CacheInvalidator>>,
    clock: Clock,
}

impl OverviewEngine {
    pub fn new(store: Arc<dyn RowStore>, cache: Arc<dyn CacheStore>, config: CoreConfig) -> Self {
        let aggregator =
            InsightAggregator::new(store.clone(), cache.clone(), config.scan, &config.cache);
        Self {
            store,
            cache,
            aggregator,
            config,
            invalidator: None,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Drop cached entries affected by writes published on `bus`
    ///
    /// No-op when `cache.invalidate_on_write` is off; the TTL then bounds
    /// staleness.
    pub fn with_invalidation(mut self, bus: &EventBus) -> Self {
        if self.config.cache.invalidate_on_write {
            self.invalidator = Some(Mutex::new(CacheInvalidator::new(self.cache.clone(), bus)));
        }
        self
    }

    /// Replace the wall clock used for time windows
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn aggregator(&self) -> &InsightAggregator {
        &self.aggregator
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn sync_invalidations(&self) {
        if let Some(invalidator) = &self.invalidator {
            let handled = invalidator.lock().drain();
            if handled > 0 {
                debug!(events = handled, "Applied write-path invalidations");
            }
        }
    }

    fn check(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled { rows_scanned: 0 });
        }
        Ok(())
    }

    /// Compute the full overview for `request`
    pub fn build_overview(
        &self,
        request: &OverviewRequest,
        cancel: &CancellationToken,
    ) -> Result<OverviewResult> {
        self.sync_invalidations();
        let mut warnings = request.warnings.clone();

        let plugin = request.plugin_filter.as_deref();
        let filter = TelemetryFilter::for_plugin(plugin).with_range(request.date_range);

        Self::check(cancel)?;
        let daily = self
            .store
            .daily_counts(&filter, self.config.report.chart_days)?;
        let date_chart = build_date_chart(daily);

        Self::check(cancel)?;
        let plugin_chart =
            build_plugin_chart(self.store.plugin_counts(&filter, PLUGIN_CHART_SIZE)?);

        Self::check(cancel)?;
        let stats = tally(&self.store.status_rows(&filter)?).into();

        Self::check(cancel)?;
        let top_plugins = self.top_plugins(&TopPluginsQuery {
            limit: request
                .limit
                .unwrap_or(TopLimit::Count(self.config.report.top_limit)),
            sort: request.status_sort,
            window: request.time_window,
            plugin_filter: request.plugin_filter.clone(),
        })?;

        let (insights, set) = self.insights(plugin, request.date_range.as_ref(), cancel)?;
        warnings.extend(insights.warnings);

        if set.truncated {
            warnings.push(format!(
                "insight scan stopped after {} rows; distributions are partial",
                set.rows_scanned
            ));
        }
        if set.malformed_payloads > 0 {
            warnings.push(format!(
                "{} malformed payloads were treated as empty",
                set.malformed_payloads
            ));
        }

        Ok(OverviewResult {
            stats,
            date_chart,
            plugin_chart,
            top_plugins,
            insights: insights.value,
            filter_name: request.plugin_filter.clone(),
            truncated: set.truncated,
            warnings,
            computed_at: Utc::now(),
        })
    }

    /// Top-plugins table
    pub fn top_plugins(&self, query: &TopPluginsQuery) -> Result<Vec<RankedPlugin>> {
        rank_top_plugins(self.store.as_ref(), query, (self.clock)())
    }

    /// Environment distributions, date-filtered in memory
    pub fn insights(
        &self,
        plugin_filter: Option<&str>,
        date_range: Option<&DateRange>,
        cancel: &CancellationToken,
    ) -> Result<(Fetched<PluginInsights>, InsightSet)> {
        self.sync_invalidations();
        let fetched = self.aggregator.fetch_insight_records(plugin_filter, cancel)?;
        let set = fetched.value;
        let insights = build_insights(set.filtered(date_range), plugin_filter);

        Ok((
            Fetched {
                value: insights,
                source: fetched.source,
                warnings: fetched.warnings,
            },
            set,
        ))
    }

    /// Plugin name catalogue
    pub fn plugin_names(&self) -> Result<Arc<Vec<String>>> {
        self.sync_invalidations();
        Ok(self.aggregator.fetch_plugin_names()?.value)
    }

    /// Drop every cached value
    pub fn clear_cache(&self) -> Result<()> {
        self.cache.invalidate_all()
    }
}
