//! Activation status of a site

use crate::store::StatusRow;
use chrono::NaiveDateTime;
use cpfm_types::{ActivationStatus, PluginStatusCounts};

/// Activated unless the site's last heartbeat is not newer than its last deactivation
///
/// A heartbeat strictly after the deactivation means the plugin was
/// re-activated; equal timestamps count as deactivated.
pub fn classify(
    update_date: NaiveDateTime,
    deactivation_date: Option<NaiveDateTime>,
) -> ActivationStatus {
    match deactivation_date {
        Some(deactivated) if update_date <= deactivated => ActivationStatus::Deactivated,
        _ => ActivationStatus::Activated,
    }
}

/// Classify and count every row
pub fn tally<'a>(rows: impl IntoIterator<Item = &'a StatusRow>) -> PluginStatusCounts {
    let mut counts = PluginStatusCounts::default();
    for row in rows {
        counts.record(classify(row.update_date, row.deactivation_date));
    }
    counts
}
