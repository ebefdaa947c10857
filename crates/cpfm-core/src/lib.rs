//! cpfm-core - Core library for cpfm
//!
//! Provides the telemetry row store, payload parsers, insight cache and the
//! aggregation engine behind the plugin feedback overview.

pub mod analytics;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod parsers;
pub mod store;

pub use analytics::{OverviewEngine, OverviewParams, OverviewRequest, TopPluginsQuery};
pub use cache::{build_cache, CacheEntry, CacheInvalidator, CacheStore};
pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use event::{DataEvent, EventBus};
pub use export::{export_feedback_to_csv, export_overview_to_json};
pub use store::{FeedbackFilter, RowStore, SqliteRowStore, TelemetryFilter};
