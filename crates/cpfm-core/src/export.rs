//! Export of feedback rows and overview results
//!
//! Provides simple, testable export with proper error handling.

use anyhow::{Context, Result};
use cpfm_types::{FeedbackRecord, OverviewResult, TIMESTAMP_FORMAT};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const FEEDBACK_HEADER: &str =
    "id,plugin_version,plugin_name,plugin_initial,reason,review,domain,email,deactivation_date";

/// Quote a CSV field when it contains a separator, quote or line break
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Write feedback rows as CSV
///
/// CSV columns: id, plugin_version, plugin_name, plugin_initial, reason,
/// review, domain, email, deactivation_date. Rows keep the input order.
///
/// # Errors
/// Returns error if file creation or write operations fail
///
/// # Examples
///
/// ```no_run
/// use cpfm_core::export::export_feedback_to_csv;
/// use std::path::Path;
///
/// export_feedback_to_csv(&[], Path::new("feedback.csv")).unwrap();
/// ```
pub fn export_feedback_to_csv(rows: &[FeedbackRecord], path: &Path) -> Result<()> {
    let mut writer = create_writer(path)?;
    write_feedback_csv(rows, &mut writer)?;
    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

/// Write feedback rows as CSV to any writer
pub fn write_feedback_csv<W: Write>(rows: &[FeedbackRecord], writer: &mut W) -> Result<()> {
    writeln!(writer, "{}", FEEDBACK_HEADER).context("Failed to write CSV header")?;

    for row in rows {
        let date = row.deactivation_date.format(TIMESTAMP_FORMAT).to_string();
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{}",
            row.id,
            csv_field(&row.plugin_version),
            csv_field(&row.plugin_name),
            csv_field(&row.plugin_initial),
            csv_field(&row.reason),
            csv_field(&row.review),
            csv_field(&row.domain),
            csv_field(row.email.as_deref().unwrap_or("")),
            date
        )
        .with_context(|| format!("Failed to write row for feedback {}", row.id))?;
    }

    Ok(())
}

/// Write an overview result as pretty-printed JSON
pub fn export_overview_to_json(result: &OverviewResult, path: &Path) -> Result<()> {
    let mut writer = create_writer(path)?;
    let json =
        serde_json::to_string_pretty(result).context("Failed to serialize overview to JSON")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write JSON")?;
    writer.flush().context("Failed to flush JSON writer")?;
    Ok(())
}
