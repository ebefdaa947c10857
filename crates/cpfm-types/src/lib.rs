//! cpfm-types - Shared data types for cpfm
//!
//! This crate contains pure data structures without heavy dependencies.
//! No tokio, no SQLite - just serde-serializable types.
//!
//! Used by:
//! - cpfm-core (store, cache, aggregation engine)
//! - cpfm (command line front-end)

pub mod display;
pub mod filters;
pub mod models;
pub mod overview;

pub use display::title_case;
pub use filters::{DateRange, StatusSort, TimeWindow, TopLimit};
pub use models::{
    ActivationStatus, ActivePlugin, CompactInsightRecord, ExtraDetails, FeedbackRecord,
    InsightSet, NewFeedback, PluginStatusCounts, ServerInfo, SiteTelemetryRecord, ThemeInfo,
    TIMESTAMP_FORMAT,
};
pub use overview::{
    DateChart, DistributionEntry, OverviewResult, PluginChart, PluginInsights, RankedPlugin,
    StatusStats,
};
