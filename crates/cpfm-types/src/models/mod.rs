//! Data models for cpfm

pub mod insight;
pub mod payload;
pub mod records;
pub mod status;

pub use insight::{CompactInsightRecord, InsightSet};
pub use payload::{ActivePlugin, ExtraDetails, ServerInfo, ThemeInfo};
pub use records::{FeedbackRecord, NewFeedback, SiteTelemetryRecord, TIMESTAMP_FORMAT};
pub use status::{ActivationStatus, PluginStatusCounts};
