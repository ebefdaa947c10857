//! Aggregation and reporting engine
//!
//! Turns raw telemetry and feedback rows into activation statistics,
//! plugin rankings, installation charts and environment distributions.

pub mod aggregator;
pub mod classifier;
pub mod distributions;
pub mod matcher;
pub mod overview;
pub mod ranker;
pub mod timeseries;


pub use aggregator::{compact_record, FetchSource, Fetched, InsightAggregator};
pub use classifier::{classify, tally};
pub use distributions::{build_insights, Histogram, InsightAccumulator};
pub use matcher::{is_same_plugin, similarity, PluginMatcher};
pub use overview::{OverviewEngine, OverviewParams, OverviewRequest};
pub use ranker::{rank_rows, rank_top_plugins, TopPluginsQuery};
pub use timeseries::{build_date_chart, build_plugin_chart};
