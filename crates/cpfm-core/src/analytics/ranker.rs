//! Top-plugins ranking
//!
//! Rows are tallied per trimmed plugin name in the order names first
//! appear, then stably sorted so equal keys keep that order.

use super::classifier::classify;
use super::matcher::PluginMatcher;
use crate::error::Result;
use crate::store::{RowStore, StatusRow, TelemetryFilter};
use chrono::NaiveDateTime;
use cpfm_types::{PluginStatusCounts, RankedPlugin, StatusSort, TimeWindow, TopLimit};
use std::collections::HashMap;

/// Parameters of one ranking
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopPluginsQuery {
    pub limit: TopLimit,
    pub sort: StatusSort,
    pub window: TimeWindow,
    /// Plugin whose own row (and name variants) is left out
    pub plugin_filter: Option<String>,
}

/// Rank already-fetched status rows
pub fn rank_rows(
    rows: &[StatusRow],
    sort: StatusSort,
    exclude: Option<&PluginMatcher>,
    limit: TopLimit,
) -> Vec<RankedPlugin> {
    let mut order: Vec<(String, PluginStatusCounts)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        let name = row.plugin_name.trim();
        if name.is_empty() {
            continue;
        }
        let slot = *index.entry(name).or_insert_with(|| {
            order.push((name.to_string(), PluginStatusCounts::default()));
            order.len() - 1
        });
        order[slot]
            .1
            .record(classify(row.update_date, row.deactivation_date));
    }

    order.sort_by(|a, b| sort.key(&b.1).cmp(&sort.key(&a.1)));

    if let Some(matcher) = exclude {
        order.retain(|(name, _)| !matcher.matches(name));
    }

    let mut ranked: Vec<RankedPlugin> = order
        .into_iter()
        .map(|(name, counts)| RankedPlugin::new(name, counts))
        .collect();
    limit.apply(&mut ranked);
    ranked
}

/// Query the store and rank every named plugin inside the time window
pub fn rank_top_plugins(
    store: &dyn RowStore,
    query: &TopPluginsQuery,
    now: NaiveDateTime,
) -> Result<Vec<RankedPlugin>> {
    let filter = TelemetryFilter::default()
        .named_only()
        .since(query.window.cutoff(now));
    let rows = store.status_rows(&filter)?;

    let matcher = query
        .plugin_filter
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(PluginMatcher::new);

    Ok(rank_rows(&rows, query.sort, matcher.as_ref(), query.limit))
}
