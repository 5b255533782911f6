use std::path::{Path, PathBuf};

use clap::Parser;
use pubfeed_core::config_file;
use pubfeed_core::{Config, HttpFetcher, SnapshotLayout};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Refresh a publication feed from a DBLP person page.
///
/// With no arguments, fetches the configured page, resolves venue names and
/// writes the snapshot. Failures are logged; the exit status is always 0.
#[derive(Parser, Debug)]
#[command(name = "pubfeed", version, about, long_about = None)]
struct Cli {
    /// DBLP person page to scrape
    #[arg(long)]
    index_url: Option<String>,

    /// Snapshot output path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Venue name map path
    #[arg(long)]
    venue_map: Option<PathBuf>,

    /// Keep venue abbreviations instead of resolving full names
    #[arg(long)]
    no_enrich: bool,

    /// Snapshot layout: full, enriched or plain
    #[arg(long)]
    layout: Option<SnapshotLayout>,

    /// Drop a trailing "(ABBR)" from resolved venue names
    #[arg(long)]
    strip_venue_abbreviation: bool,

    /// Extra config file, applied over the platform and CWD configs
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _guard = init_tracing(&cli.log_level, cli.log_file.as_deref());

    let config = resolve_config(&cli);
    tracing::debug!(?config, "resolved configuration");

    let fetcher = match HttpFetcher::new() {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(error = %e, "failed to build HTTP client");
            return Ok(());
        }
    };

    match pubfeed_core::run(&config, &fetcher).await {
        Ok(summary) => tracing::info!(
            records = summary.records,
            skipped = summary.skip_stats.skipped(),
            venue_fetches = summary.venue_fetches,
            venue_hits = summary.venue_hits,
            snapshot_written = summary.snapshot_written,
            venue_map_saved = summary.venue_map_saved,
            "done"
        ),
        Err(e) => tracing::error!(error = %e, "run failed"),
    }

    Ok(())
}

/// Resolve configuration: CLI flags > env vars > config files > defaults.
fn resolve_config(cli: &Cli) -> Config {
    let mut file = config_file::load_config();
    if let Some(path) = &cli.config {
        match config_file::load_from_path(path) {
            Some(extra) => file = config_file::merge(file, extra),
            None => tracing::warn!(path = %path.display(), "config file not loaded"),
        }
    }
    let mut config = config_file::apply(&file, Config::default());
    apply_env(&mut config);

    if let Some(url) = &cli.index_url {
        config.index_url = url.clone();
    }
    if let Some(path) = &cli.output {
        config.output_path = path.clone();
    }
    if let Some(path) = &cli.venue_map {
        config.venue_map_path = path.clone();
    }
    if cli.no_enrich {
        config.enrich_venues = false;
    }
    if let Some(layout) = cli.layout {
        config.snapshot = layout.options();
    }
    if cli.strip_venue_abbreviation {
        config.venue.strip_trailing_abbreviation = true;
    }
    config
}

fn apply_env(config: &mut Config) {
    if let Ok(url) = std::env::var("PUBFEED_INDEX_URL") {
        config.index_url = url;
    }
    if let Ok(path) = std::env::var("PUBFEED_OUTPUT") {
        config.output_path = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("PUBFEED_VENUE_MAP") {
        config.venue_map_path = PathBuf::from(path);
    }
}

/// Install the global subscriber. The returned guard flushes the log file
/// on drop and must live until the end of `main`.
fn init_tracing(log_level: &str, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    let file_target = log_file.and_then(|path| {
        let name = path.file_name()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir).ok()?;
        Some((dir.to_path_buf(), name.to_owned()))
    });

    match file_target {
        Some((dir, name)) => {
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            if let Some(path) = log_file {
                tracing::warn!(path = %path.display(), "cannot log to file, using stderr");
            }
            None
        }
    }
}
