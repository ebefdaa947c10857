//! Output formatting and NDJSON import parsing for the command line

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use cpfm_types::{
    DateChart, DistributionEntry, NewFeedback, OverviewResult, PluginStatusCounts, RankedPlugin,
    SiteTelemetryRecord,
};
use serde::Deserialize;

// ============================================================================
// Import
// ============================================================================

/// One line of an NDJSON import file
///
/// ```json
/// {"kind":"telemetry","site_id":"abc","plugin_name":"Cool Timeline","plugin_version":"2.1","update_date":"2024-01-05T10:00:00"}
/// {"kind":"feedback","plugin_name":"Cool Timeline","plugin_version":"2.1","reason":"temporary","deactivation_date":"2024-01-06T09:00:00"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImportRecord {
    Telemetry(SiteTelemetryRecord),
    Feedback(NewFeedback),
}

/// Parse one import line; blank lines and `#` comments yield `None`
pub fn parse_import_line(line: &str) -> Result<Option<ImportRecord>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let record = serde_json::from_str(line).context("Invalid import record")?;
    Ok(Some(record))
}

/// Counters reported at the end of an import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub telemetry: usize,
    pub feedback: usize,
    pub skipped: usize,
}

// ============================================================================
// Tables
// ============================================================================

fn new_table(headers: &[&str], no_color: bool) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    if no_color {
        table.set_header(headers.to_vec());
    } else {
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
    table
}

/// Top-plugins table (human) or JSON
pub fn format_top_table(plugins: &[RankedPlugin], json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(plugins).unwrap_or_else(|_| "[]".to_string());
    }

    if plugins.is_empty() {
        return "No plugins found.".to_string();
    }

    let mut table = new_table(
        &["#", "Plugin", "Total", "Activated", "Deactivated", "Active %"],
        no_color,
    );

    for (i, plugin) in plugins.iter().enumerate() {
        let rate = format!("{:.1}%", plugin.activation_rate);
        let rate_cell = if no_color {
            Cell::new(rate)
        } else {
            Cell::new(rate).fg(rate_color(plugin.activation_rate))
        };
        table.add_row(Row::from(vec![
            Cell::new(i + 1),
            Cell::new(&plugin.plugin_name),
            Cell::new(plugin.total),
            Cell::new(plugin.activated),
            Cell::new(plugin.deactivated),
            rate_cell,
        ]));
    }

    table.to_string()
}

fn rate_color(rate: f64) -> Color {
    if rate >= 75.0 {
        Color::Green
    } else if rate >= 50.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Label/count table for one distribution
pub fn format_distribution(title: &str, entries: &[DistributionEntry], no_color: bool) -> String {
    if entries.is_empty() {
        return format!("{}: no data", title);
    }

    let total: u64 = entries.iter().map(|e| e.count).sum();
    let mut table = new_table(&[title, "Count", "Share"], no_color);
    for entry in entries {
        let share = entry.count as f64 / total as f64 * 100.0;
        table.add_row(Row::from(vec![
            entry.label.clone(),
            entry.count.to_string(),
            format!("{:.1}%", share),
        ]));
    }
    table.to_string()
}

/// Daily installations with a proportional bar column
pub fn format_date_chart(chart: &DateChart, no_color: bool) -> String {
    if chart.data.is_empty() {
        return "Daily installations: no data".to_string();
    }

    let max = chart.data.iter().copied().max().unwrap_or(1).max(1);
    let mut table = new_table(&["Date", "Installs", ""], no_color);
    for (date, count) in chart.dates.iter().zip(&chart.data) {
        let width = (*count as f64 / max as f64 * 30.0).round() as usize;
        table.add_row(Row::from(vec![
            date.clone(),
            count.to_string(),
            "█".repeat(width),
        ]));
    }
    table.to_string()
}

/// Full overview (human) or JSON
pub fn format_overview(result: &OverviewResult, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string());
    }

    let stats = result.stats;
    let rate = PluginStatusCounts {
        activated: stats.activated,
        deactivated: stats.deactivated,
        total: stats.total,
    }
    .activation_rate();

    let mut out = Vec::new();
    out.push(format!(
        "Overview: {}",
        result.filter_name.as_deref().unwrap_or("all plugins")
    ));
    out.push("=".repeat(40));
    out.push(format!("Sites:        {}", stats.total));
    out.push(format!("Activated:    {}", stats.activated));
    out.push(format!("Deactivated:  {}", stats.deactivated));
    out.push(format!("Active rate:  {:.1}%", rate));
    out.push(format!(
        "Unique sites: {}",
        result.insights.total_sites
    ));
    if result.truncated {
        out.push("Distributions are partial (scan stopped at the row cap)".to_string());
    }
    out.push(String::new());

    out.push(format_date_chart(&result.date_chart, no_color));
    out.push(String::new());

    out.push("Top plugins".to_string());
    out.push(format_top_table(&result.top_plugins, false, no_color));
    out.push(String::new());

    let insights = &result.insights;
    if !insights.versions.is_empty() {
        out.push(format_distribution("Plugin version", &insights.versions, no_color));
        out.push(String::new());
    }
    out.push(format_distribution("WordPress", &insights.wp_versions, no_color));
    out.push(String::new());
    out.push(format_distribution("PHP", &insights.php_versions, no_color));
    out.push(String::new());
    out.push(format_distribution("Theme", &insights.themes, no_color));
    out.push(String::new());
    out.push(format_distribution(
        "Also active",
        &insights.active_plugins,
        no_color,
    ));

    out.join("\n")
}

/// Plugin name catalogue (one per line) or JSON
pub fn format_plugin_names(names: &[String], json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(names).unwrap_or_else(|_| "[]".to_string());
    }
    if names.is_empty() {
        return "No plugins found.".to_string();
    }
    names.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpfm_types::PluginInsights;

    fn ranked(name: &str, activated: u64, deactivated: u64) -> RankedPlugin {
        RankedPlugin::new(
            name.to_string(),
            PluginStatusCounts {
                activated,
                deactivated,
                total: activated + deactivated,
            },
        )
    }

    #[test]
    fn test_parse_import_telemetry_line() {
        let line = r#"{"kind":"telemetry","site_id":"s1","plugin_name":"Cool Timeline","plugin_version":"2.1","update_date":"2024-01-05T10:00:00"}"#;
        match parse_import_line(line).unwrap() {
            Some(ImportRecord::Telemetry(record)) => {
                assert_eq!(record.site_id, "s1");
                assert_eq!(record.server_info, None);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_import_feedback_line() {
        let line = r#"{"kind":"feedback","plugin_name":"Cool Timeline","plugin_version":"2.1","reason":"temporary","deactivation_date":"2024-01-06T09:00:00","site_id":"s1"}"#;
        match parse_import_line(line).unwrap() {
            Some(ImportRecord::Feedback(feedback)) => {
                assert_eq!(feedback.reason, "temporary");
                assert_eq!(feedback.site_id.as_deref(), Some("s1"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_import_skips_blank_and_comments() {
        assert!(parse_import_line("").unwrap().is_none());
        assert!(parse_import_line("   ").unwrap().is_none());
        assert!(parse_import_line("# exported 2024-01-01").unwrap().is_none());
    }

    #[test]
    fn test_parse_import_rejects_unknown_kind() {
        assert!(parse_import_line(r#"{"kind":"review"}"#).is_err());
        assert!(parse_import_line("not json").is_err());
    }

    #[test]
    fn test_format_top_table_empty() {
        assert_eq!(format_top_table(&[], false, true), "No plugins found.");
        assert_eq!(format_top_table(&[], true, true), "[]");
    }

    #[test]
    fn test_format_top_table_rows() {
        let table = format_top_table(
            &[ranked("Cool Timeline", 8, 2), ranked("Events Calendar", 1, 1)],
            false,
            true,
        );
        assert!(table.contains("Cool Timeline"));
        assert!(table.contains("80.0%"));
        assert!(table.contains("50.0%"));
    }

    #[test]
    fn test_format_distribution_share() {
        let entries = vec![
            DistributionEntry {
                label: "8.2".to_string(),
                count: 3,
            },
            DistributionEntry {
                label: "8.1".to_string(),
                count: 1,
            },
        ];
        let table = format_distribution("PHP", &entries, true);
        assert!(table.contains("75.0%"));
        assert!(table.contains("25.0%"));
        assert_eq!(format_distribution("PHP", &[], true), "PHP: no data");
    }

    #[test]
    fn test_format_overview_sections() {
        let result = OverviewResult {
            stats: Default::default(),
            date_chart: Default::default(),
            plugin_chart: Default::default(),
            top_plugins: vec![ranked("Cool Timeline", 1, 0)],
            insights: PluginInsights::default(),
            filter_name: None,
            truncated: true,
            warnings: Vec::new(),
            computed_at: chrono::Utc::now(),
        };
        let text = format_overview(&result, false, true);
        assert!(text.starts_with("Overview: all plugins"));
        assert!(text.contains("row cap"));
        assert!(text.contains("Daily installations: no data"));
        assert!(text.contains("Cool Timeline"));
    }
}
