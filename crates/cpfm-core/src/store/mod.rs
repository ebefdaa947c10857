//! Row store: telemetry and feedback tables
//!
//! The engine only reads through [`RowStore`]. Reads are independent and
//! bounded; nothing is held across calls, so a batched scan never pins the
//! connection between batches.

pub mod query;
pub mod sqlite;

pub use query::QueryBuilder;
pub use sqlite::SqliteRowStore;

use crate::error::Result;
use chrono::{NaiveDate, NaiveDateTime};
use cpfm_types::{DateRange, FeedbackRecord};

/// Telemetry columns the insight scan needs
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRow {
    pub site_id: String,
    pub plugin_name: String,
    pub plugin_version: String,
    pub server_info: Option<String>,
    pub extra_details: Option<String>,
    pub update_date: NaiveDateTime,
}

/// Telemetry row joined with the site's latest deactivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    /// Trimmed plugin name
    pub plugin_name: String,
    pub site_id: String,
    pub update_date: NaiveDateTime,
    pub deactivation_date: Option<NaiveDateTime>,
}

/// Comparison form of a plugin name: trimmed and Unicode lower-cased
///
/// The SQLite store registers this as `cpfm_fold` so SQL filters and cache
/// keys fold names the same way.
pub fn fold_plugin_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Filters on the telemetry table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryFilter {
    /// Matches names whose [`fold_plugin_name`] forms are equal
    pub plugin_name: Option<String>,
    /// Inclusive range on `update_date`
    pub date_range: Option<DateRange>,
    /// Lower bound on `update_date` (time-window rankings)
    pub updated_since: Option<NaiveDateTime>,
    /// Skip rows whose trimmed plugin name is empty
    pub require_plugin_name: bool,
}

impl TelemetryFilter {
    pub fn for_plugin(plugin_name: Option<&str>) -> Self {
        Self {
            plugin_name: plugin_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, range: Option<DateRange>) -> Self {
        self.date_range = range;
        self
    }

    pub fn since(mut self, cutoff: Option<NaiveDateTime>) -> Self {
        self.updated_since = cutoff;
        self
    }

    pub fn named_only(mut self) -> Self {
        self.require_plugin_name = true;
        self
    }
}

/// Filters on the feedback table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackFilter {
    /// Substring of the plugin name
    pub plugin_search: Option<String>,
    /// Inclusive range on `deactivation_date`
    pub date_range: Option<DateRange>,
    pub limit: Option<usize>,
}

/// Read access the engine needs from durable storage
pub trait RowStore: Send + Sync {
    /// One page of telemetry ordered by `site_id` ascending
    fn telemetry_batch(
        &self,
        filter: &TelemetryFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TelemetryRow>>;

    /// Telemetry rows with the latest deactivation per site
    fn status_rows(&self, filter: &TelemetryFilter) -> Result<Vec<StatusRow>>;

    /// Row count per calendar day of `update_date`, newest first, at most `days` days
    fn daily_counts(&self, filter: &TelemetryFilter, days: usize) -> Result<Vec<(NaiveDate, u64)>>;

    /// Row count per trimmed plugin name, largest first
    fn plugin_counts(&self, filter: &TelemetryFilter, limit: usize) -> Result<Vec<(String, u64)>>;

    /// Distinct trimmed non-empty plugin names, ascending
    fn plugin_names(&self) -> Result<Vec<String>>;

    /// Feedback rows, newest first
    fn query_feedback(&self, filter: &FeedbackFilter) -> Result<Vec<FeedbackRecord>>;
}
