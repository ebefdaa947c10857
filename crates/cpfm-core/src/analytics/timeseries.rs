//! Chart series: daily installations and installations per plugin

use chrono::NaiveDate;
use cpfm_types::{title_case, DateChart, PluginChart};

/// Bars in the per-plugin installation chart
pub const PLUGIN_CHART_SIZE: usize = 10;

/// Chronological chart from per-day counts in any order
///
/// The store returns the most recent days first; charts read left to right.
pub fn build_date_chart(mut daily: Vec<(NaiveDate, u64)>) -> DateChart {
    daily.sort_by_key(|(day, _)| *day);

    let mut chart = DateChart::default();
    for (day, count) in daily {
        chart.labels.push(day.format("%b %-d").to_string());
        chart.dates.push(day.format("%Y-%m-%d").to_string());
        chart.data.push(count);
    }
    chart
}

/// Per-plugin chart with display-cased labels
pub fn build_plugin_chart(counts: Vec<(String, u64)>) -> PluginChart {
    let (labels, data) = counts
        .into_iter()
        .map(|(name, count)| (title_case(&name), count))
        .unzip();
    PluginChart { labels, data }
}
