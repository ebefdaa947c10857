//! cpfm - Plugin feedback & telemetry insights

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cpfm_core::cache::{build_cache, CacheInvalidator};
use cpfm_core::{
    export_feedback_to_csv, export_overview_to_json, CoreConfig, EventBus, FeedbackFilter,
    OverviewEngine, OverviewParams, OverviewRequest, SqliteRowStore, TopPluginsQuery,
};
use cpfm_types::{DateRange, StatusSort, TimeWindow, TopLimit};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Telemetry rows written per transaction during import
const IMPORT_CHUNK: usize = 500;

#[derive(Parser)]
#[command(
    name = "cpfm",
    version,
    about = "Plugin feedback & telemetry insights",
    long_about = "Aggregates plugin deactivation feedback and site heartbeat telemetry\n\
                  into activation statistics, rankings and environment distributions.\n\
                  \n\
                  Examples:\n\
                    cpfm overview                               # All plugins\n\
                    cpfm overview --plugin \"Cool Timeline\"      # One plugin\n\
                    cpfm overview --from 2024-01-01 --to 2024-01-31\n\
                    cpfm top --sort deactivated --window 1month\n\
                    cpfm import heartbeats.ndjson\n\
                    cpfm export-feedback --out feedback.csv\n\
                  \n\
                  Environment Variables:\n\
                    CPFM_CONFIG                   # Config file (default ~/.config/cpfm/config.toml)\n\
                    CPFM_DB                       # SQLite database file\n\
                    CPFM_NO_COLOR                 # Disable ANSI colors\n\
                    RUST_LOG                      # Log filter (overrides logging.level)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file path
    #[arg(long, global = true, env = "CPFM_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides store.path)
    #[arg(long, global = true, env = "CPFM_DB")]
    db: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, global = true, env = "CPFM_NO_COLOR")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Full dashboard overview
    Overview {
        /// Plugin name filter
        #[arg(long, short = 'p')]
        plugin: Option<String>,
        /// Start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: Option<String>,
        /// Top-plugins sort: total, activated, deactivated
        #[arg(long)]
        sort: Option<String>,
        /// Top-plugins window: all-time, 24hours, 1week, 1month, 1year
        #[arg(long)]
        window: Option<String>,
        /// Top-plugins rows (-1 = all)
        #[arg(long, allow_hyphen_values = true)]
        limit: Option<String>,
        /// Also write the result as JSON to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Top-plugins ranking
    Top {
        /// Sort key
        #[arg(long, default_value = "total")]
        sort: String,
        /// Time window
        #[arg(long, default_value = "all-time")]
        window: String,
        /// Number of rows (-1 = all)
        #[arg(long, short = 'n', default_value = "10", allow_hyphen_values = true)]
        limit: i64,
        /// Leave this plugin (and its name variants) out
        #[arg(long)]
        exclude: Option<String>,
    },
    /// List known plugin names
    Plugins,
    /// Export deactivation feedback to CSV
    ExportFeedback {
        /// Destination file
        #[arg(long, short = 'o')]
        out: PathBuf,
        /// Plugin name substring
        #[arg(long, short = 'p')]
        plugin: Option<String>,
        /// Start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: Option<String>,
        /// Max rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Import telemetry and feedback from an NDJSON file
    Import {
        /// NDJSON file (one {"kind": "telemetry" | "feedback", ...} per line)
        file: PathBuf,
    },
    /// Drop every cached insight set
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(CoreConfig::default_path);
    let mut config = CoreConfig::load(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
    if let Some(db) = &cli.db {
        config.store.path = db.clone();
    }

    logging::init(&config.logging, cli.no_color)?;

    let json = cli.json;
    let no_color = cli.no_color;

    match cli.command {
        Command::Overview {
            plugin,
            from,
            to,
            sort,
            window,
            limit,
            out,
        } => {
            let params = OverviewParams {
                plugin,
                date_from: from,
                date_to: to,
                status_sort: sort,
                time_window: window,
                limit,
            };
            run_overview(config, params, out, json, no_color).await?;
        }
        Command::Top {
            sort,
            window,
            limit,
            exclude,
        } => {
            run_top(config, sort, window, limit, exclude, json, no_color)?;
        }
        Command::Plugins => {
            run_plugins(config, json)?;
        }
        Command::ExportFeedback {
            out,
            plugin,
            from,
            to,
            limit,
        } => {
            run_export_feedback(config, out, plugin, from, to, limit)?;
        }
        Command::Import { file } => {
            run_import(config, file, json)?;
        }
        Command::ClearCache => {
            run_clear_cache(config)?;
        }
    }

    Ok(())
}

fn open_store(config: &CoreConfig) -> Result<SqliteRowStore> {
    SqliteRowStore::open(&config.store.path)
        .with_context(|| format!("Failed to open database: {}", config.store.path.display()))
}

fn build_engine(config: CoreConfig) -> Result<OverviewEngine> {
    let store = open_store(&config)?;
    let cache = build_cache(&config.cache).context("Failed to open cache")?;
    Ok(OverviewEngine::new(Arc::new(store), cache, config))
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

async fn run_overview(
    config: CoreConfig,
    params: OverviewParams,
    out: Option<PathBuf>,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let engine = build_engine(config)?;
    let request = OverviewRequest::from_params(&params);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let progress = (!json).then(|| spinner("Aggregating telemetry..."));

    let result = tokio::task::spawn_blocking(move || engine.build_overview(&request, &cancel))
        .await
        .context("Overview task failed")?;

    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    let result = match result {
        Err(e) if e.is_cancelled() => {
            eprintln!("Cancelled: {}", e);
            return Ok(());
        }
        other => other.context("Failed to build overview")?,
    };

    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }

    println!("{}", cli::format_overview(&result, json, no_color));

    if let Some(path) = out {
        export_overview_to_json(&result, &path)?;
        if !json {
            eprintln!("Overview written to {}", path.display());
        }
    }

    Ok(())
}

fn run_top(
    config: CoreConfig,
    sort: String,
    window: String,
    limit: i64,
    exclude: Option<String>,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let query = TopPluginsQuery {
        limit: TopLimit::from_i64(limit)
            .with_context(|| format!("Invalid limit {} (use -1 for all)", limit))?,
        sort: StatusSort::parse(&sort)
            .with_context(|| format!("Unknown sort '{}' (total, activated, deactivated)", sort))?,
        window: TimeWindow::parse(&window).with_context(|| {
            format!(
                "Unknown window '{}' (all-time, 24hours, 1week, 1month, 1year)",
                window
            )
        })?,
        plugin_filter: exclude,
    };

    let engine = build_engine(config)?;
    let ranked = engine.top_plugins(&query)?;
    println!("{}", cli::format_top_table(&ranked, json, no_color));
    Ok(())
}

fn run_plugins(config: CoreConfig, json: bool) -> Result<()> {
    let engine = build_engine(config)?;
    let names = engine.plugin_names()?;
    println!("{}", cli::format_plugin_names(&names, json));
    Ok(())
}

fn run_export_feedback(
    config: CoreConfig,
    out: PathBuf,
    plugin: Option<String>,
    from: Option<String>,
    to: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    use cpfm_core::RowStore;

    let date_range = match (from.as_deref(), to.as_deref()) {
        (Some(from), Some(to)) => Some(
            DateRange::parse(from, to)
                .with_context(|| format!("Invalid date range {}..{}", from, to))?,
        ),
        (None, None) => None,
        _ => anyhow::bail!("--from and --to must be given together"),
    };

    let store = open_store(&config)?;
    let rows = store.query_feedback(&FeedbackFilter {
        plugin_search: plugin,
        date_range,
        limit,
    })?;

    export_feedback_to_csv(&rows, &out)?;
    println!("✅ Exported {} feedback rows to {}", rows.len(), out.display());
    Ok(())
}

fn run_import(config: CoreConfig, file: PathBuf, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read import file: {}", file.display()))?;
    let lines: Vec<&str> = content.lines().collect();

    let bus = EventBus::default_capacity();
    let store = open_store(&config)?.with_events(bus.clone());

    // Subscribe before writing so the persistent cache sees every event
    let mut invalidator = if config.cache.invalidate_on_write {
        let cache = build_cache(&config.cache).context("Failed to open cache")?;
        Some(CacheInvalidator::new(cache, &bus))
    } else {
        None
    };

    let progress = ProgressBar::new(lines.len() as u64);
    if json {
        progress.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut summary = cli::ImportSummary::default();
    let mut pending = Vec::with_capacity(IMPORT_CHUNK);

    for (number, line) in lines.iter().enumerate() {
        match cli::parse_import_line(line) {
            Ok(Some(cli::ImportRecord::Telemetry(record))) => {
                pending.push(record);
                if pending.len() >= IMPORT_CHUNK {
                    summary.telemetry += store.import_telemetry(&pending)?;
                    pending.clear();
                }
            }
            Ok(Some(cli::ImportRecord::Feedback(feedback))) => {
                store.insert_feedback(&feedback)?;
                summary.feedback += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(line = number + 1, error = %e, "Skipping import line");
                summary.skipped += 1;
            }
        }
        progress.inc(1);
    }

    if !pending.is_empty() {
        summary.telemetry += store.import_telemetry(&pending)?;
    }
    progress.finish_and_clear();

    if let Some(invalidator) = invalidator.as_mut() {
        invalidator.drain();
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "telemetry": summary.telemetry,
                "feedback": summary.feedback,
                "skipped": summary.skipped,
            })
        );
    } else {
        println!(
            "✅ Imported {} telemetry rows and {} feedback rows ({} skipped)",
            summary.telemetry, summary.feedback, summary.skipped
        );
    }
    Ok(())
}

fn run_clear_cache(config: CoreConfig) -> Result<()> {
    let cache = build_cache(&config.cache).context("Failed to open cache")?;
    cache.invalidate_all()?;

    println!("✅ Cache cleared ({} backend)", cache.backend_name());
    if cache.backend_name() == "memory" {
        println!("   The memory backend lives per process; nothing persisted.");
    }
    Ok(())
}
