//! Stored records: site telemetry heartbeats and deactivation feedback
//!
//! Timestamps are the wall-clock values the sending sites report
//! (`YYYY-MM-DD HH:MM:SS`, no timezone), so they are modelled as
//! `NaiveDateTime` and compared as-is.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Storage format for every timestamp column
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One heartbeat per (site, plugin), upserted by `site_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteTelemetryRecord {
    /// Unique site key
    pub site_id: String,
    pub plugin_name: String,
    pub plugin_version: String,
    #[serde(default)]
    pub plugin_initial: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Raw serialized server info blob (JSON or PHP-serialized)
    #[serde(default)]
    pub server_info: Option<String>,
    /// Raw serialized extra details blob (JSON or PHP-serialized)
    #[serde(default)]
    pub extra_details: Option<String>,
    /// First time the site reported; preserved across upserts
    #[serde(default)]
    pub created_date: Option<NaiveDateTime>,
    /// Last time the site reported
    pub update_date: NaiveDateTime,
}

/// One row per deactivation event (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub plugin_name: String,
    pub plugin_version: String,
    pub plugin_initial: String,
    pub reason: String,
    pub review: String,
    pub domain: String,
    pub email: Option<String>,
    pub extra_details: Option<String>,
    pub server_info: Option<String>,
    pub deactivation_date: NaiveDateTime,
    /// Correlation key with the telemetry table (older senders omit it)
    pub site_id: Option<String>,
}

/// Feedback row before the store assigns its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub plugin_name: String,
    pub plugin_version: String,
    #[serde(default)]
    pub plugin_initial: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub review: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub extra_details: Option<String>,
    #[serde(default)]
    pub server_info: Option<String>,
    pub deactivation_date: NaiveDateTime,
    #[serde(default)]
    pub site_id: Option<String>,
}
