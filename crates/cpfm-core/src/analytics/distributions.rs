//! Environment distributions built from insight records
//!
//! Counting rules:
//! - plugin versions only when a plugin filter is set (versions of
//!   different plugins are not comparable)
//! - WordPress and PHP versions count every record
//! - themes and companion plugins count each site at most once per value
//! - the filtered plugin never appears among its own companions
//!
//! Ties keep the order in which values were first seen.

use super::matcher::PluginMatcher;
use cpfm_types::{CompactInsightRecord, DistributionEntry, PluginInsights};
use std::collections::{HashMap, HashSet};

pub const TOP_VERSIONS: usize = 10;
pub const TOP_WP_VERSIONS: usize = 5;
pub const TOP_PHP_VERSIONS: usize = 5;
pub const TOP_THEMES: usize = 5;
pub const TOP_ACTIVE_PLUGINS: usize = 10;

/// Frequency table preserving first-seen order
#[derive(Debug, Default)]
pub struct Histogram {
    counts: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, label: &str) {
        match self.index.get(label) {
            Some(&i) => self.counts[i].1 += 1,
            None => {
                self.index.insert(label.to_string(), self.counts.len());
                self.counts.push((label.to_string(), 1));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Drop labels for which `keep` is false
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.counts.retain(|(label, _)| keep(label));
        self.index = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, (label, _))| (label.clone(), i))
            .collect();
    }

    /// Entries by descending count (stable), at most `limit`
    pub fn top(self, limit: usize) -> Vec<DistributionEntry> {
        let mut counts = self.counts;
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.truncate(limit);
        counts
            .into_iter()
            .map(|(label, count)| DistributionEntry { label, count })
            .collect()
    }
}

/// Histogram counting each site at most once per value
#[derive(Debug, Default)]
pub struct SiteDedupHistogram {
    histogram: Histogram,
    seen: HashSet<(String, String)>,
}

impl SiteDedupHistogram {
    /// Count `label` for `site_id` unless already counted; an empty site id
    /// cannot be deduplicated and always counts
    pub fn add(&mut self, site_id: &str, label: &str) {
        if site_id.is_empty() || self.seen.insert((site_id.to_string(), label.to_string())) {
            self.histogram.add(label);
        }
    }

    pub fn into_histogram(self) -> Histogram {
        self.histogram
    }
}

/// Accumulates every distribution in one pass over the records
#[derive(Debug, Default)]
pub struct InsightAccumulator {
    with_versions: bool,
    versions: Histogram,
    wp_versions: Histogram,
    php_versions: Histogram,
    themes: SiteDedupHistogram,
    active_plugins: SiteDedupHistogram,
    sites: HashSet<String>,
}

impl InsightAccumulator {
    pub fn new(with_versions: bool) -> Self {
        Self {
            with_versions,
            ..Default::default()
        }
    }

    pub fn add(&mut self, record: &CompactInsightRecord) {
        if !record.site_id.is_empty() {
            self.sites.insert(record.site_id.clone());
        }

        if self.with_versions {
            if let Some(version) = &record.plugin_version {
                self.versions.add(version);
            }
        }
        if let Some(wp) = &record.wp_version {
            self.wp_versions.add(wp);
        }
        if let Some(php) = &record.php_version {
            self.php_versions.add(php);
        }
        if let Some(theme) = &record.theme_name {
            self.themes.add(&record.site_id, theme);
        }
        for plugin in &record.active_plugins {
            self.active_plugins.add(&record.site_id, plugin);
        }
    }

    /// Shape the result, removing `exclude` from the companion plugins
    pub fn finish(self, exclude: Option<&PluginMatcher>) -> PluginInsights {
        let mut active_plugins = self.active_plugins.into_histogram();
        if let Some(matcher) = exclude {
            active_plugins.retain(|name| !matcher.matches(name));
        }

        PluginInsights {
            total_sites: self.sites.len() as u64,
            versions: self.versions.top(TOP_VERSIONS),
            wp_versions: self.wp_versions.top(TOP_WP_VERSIONS),
            php_versions: self.php_versions.top(TOP_PHP_VERSIONS),
            themes: self.themes.into_histogram().top(TOP_THEMES),
            active_plugins: active_plugins.top(TOP_ACTIVE_PLUGINS),
        }
    }
}

/// Build all distributions for `records`
///
/// `plugin_filter` enables the version histogram and the self-exclusion
/// of the companion plugin list.
pub fn build_insights<'a>(
    records: impl IntoIterator<Item = &'a CompactInsightRecord>,
    plugin_filter: Option<&str>,
) -> PluginInsights {
    let matcher = plugin_filter.map(PluginMatcher::new);
    let mut acc = InsightAccumulator::new(matcher.is_some());
    for record in records {
        acc.add(record);
    }
    acc.finish(matcher.as_ref())
}
