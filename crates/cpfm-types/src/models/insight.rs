//! Compact per-site insight records
//!
//! A `CompactInsightRecord` keeps only what the insight distributions need.
//! Raw telemetry rows carry two nested blobs (server info, extra details with
//! the full active plugin list); the compact form is one to two orders of
//! magnitude smaller, which is what lets a full-table scan stay in memory
//! and be cached as a whole.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::filters::DateRange;

/// Reporting projection of one telemetry row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactInsightRecord {
    pub site_id: String,
    pub update_date: NaiveDateTime,
    pub plugin_version: Option<String>,
    pub wp_version: Option<String>,
    pub php_version: Option<String>,
    pub theme_name: Option<String>,
    pub active_plugins: Vec<String>,
}

impl CompactInsightRecord {
    /// Whether the record's last heartbeat falls inside `range` (inclusive)
    pub fn within(&self, range: &DateRange) -> bool {
        range.contains(&self.update_date)
    }
}

/// Result of one aggregation scan, the unit stored in the cache
///
/// Cloning is cheap: the record list is shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightSet {
    pub records: Arc<Vec<CompactInsightRecord>>,
    /// The scan stopped at the safety cap while more rows were available
    pub truncated: bool,
    /// Raw rows read from the store
    pub rows_scanned: usize,
    /// Payload blobs that failed to decode and were treated as empty
    pub malformed_payloads: usize,
}

impl InsightSet {
    pub fn empty() -> Self {
        Self {
            records: Arc::new(Vec::new()),
            truncated: false,
            rows_scanned: 0,
            malformed_payloads: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records inside `range`, or every record when no range is given
    pub fn filtered<'a>(
        &'a self,
        range: Option<&'a DateRange>,
    ) -> impl Iterator<Item = &'a CompactInsightRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| range.map(|range| r.within(range)).unwrap_or(true))
    }
}
