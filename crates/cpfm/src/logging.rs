//! Logging setup for the command line
//!
//! Logs go to stderr so `--json` output on stdout stays machine-readable.

use anyhow::{Context, Result};
use cpfm_core::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber
///
/// Level comes from `RUST_LOG` when set, otherwise from `logging.level`.
pub fn init(config: &LoggingConfig, no_color: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(!no_color)
                    .with_target(false),
            )
            .try_init()
    };
    result.context("Failed to initialize logging")
}
