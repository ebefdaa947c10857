//! Overview result returned to presentation layers
//!
//! Field names are the contract the dashboard depends on; ordered
//! distributions are lists (not maps) so their ranking survives JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PluginStatusCounts;

/// Activated / deactivated totals across the filtered rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusStats {
    pub total: u64,
    pub activated: u64,
    pub deactivated: u64,
}

impl From<PluginStatusCounts> for StatusStats {
    fn from(counts: PluginStatusCounts) -> Self {
        Self {
            total: counts.total,
            activated: counts.activated,
            deactivated: counts.deactivated,
        }
    }
}

/// Daily installations, chronological
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateChart {
    /// Short display labels ("Jan 5")
    pub labels: Vec<String>,
    /// ISO dates aligned with `labels`
    pub dates: Vec<String>,
    pub data: Vec<u64>,
}

impl DateChart {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Sites per plugin name (installation bar chart)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginChart {
    pub labels: Vec<String>,
    pub data: Vec<u64>,
}

/// One row of the top-plugins table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPlugin {
    pub plugin_name: String,
    pub activated: u64,
    pub deactivated: u64,
    pub total: u64,
    /// Percent of activated sites, one decimal
    pub activation_rate: f64,
}

impl RankedPlugin {
    pub fn new(plugin_name: String, counts: PluginStatusCounts) -> Self {
        Self {
            plugin_name,
            activated: counts.activated,
            deactivated: counts.deactivated,
            total: counts.total,
            activation_rate: counts.activation_rate(),
        }
    }

    pub fn counts(&self) -> PluginStatusCounts {
        PluginStatusCounts {
            activated: self.activated,
            deactivated: self.deactivated,
            total: self.total,
        }
    }
}

/// One bar of a frequency distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEntry {
    pub label: String,
    pub count: u64,
}

/// Environment distributions computed from insight records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInsights {
    pub total_sites: u64,
    /// Plugin versions (only when a plugin filter is set)
    pub versions: Vec<DistributionEntry>,
    pub wp_versions: Vec<DistributionEntry>,
    pub php_versions: Vec<DistributionEntry>,
    pub themes: Vec<DistributionEntry>,
    /// Other plugins active alongside the filtered one
    pub active_plugins: Vec<DistributionEntry>,
}

/// Everything the overview dashboard renders for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewResult {
    pub stats: StatusStats,
    pub date_chart: DateChart,
    pub plugin_chart: PluginChart,
    pub top_plugins: Vec<RankedPlugin>,
    pub insights: PluginInsights,
    /// Plugin filter the result was computed for (`None` = all plugins)
    pub filter_name: Option<String>,
    /// Insight scan stopped at the row safety cap
    pub truncated: bool,
    /// Locally recovered problems (bad filter input, cache failures, ...)
    pub warnings: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranked_plugin_carries_rate() {
        let ranked = RankedPlugin::new(
            "Cool Timeline".into(),
            PluginStatusCounts {
                activated: 3,
                deactivated: 1,
                total: 4,
            },
        );
        assert_eq!(ranked.activation_rate, 75.0);
        assert_eq!(ranked.counts().total, 4);
    }

    #[test]
    fn test_status_stats_json_field_names() {
        let json = serde_json::to_value(StatusStats {
            total: 3,
            activated: 2,
            deactivated: 1,
        })
        .unwrap();
        assert_eq!(json["total"], 3);
        assert_eq!(json["activated"], 2);
        assert_eq!(json["deactivated"], 1);
    }
}
