use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use gindex_core::config::AppConfig;
use gindex_core::models::EntityKey;
use gindex_core::store::TracingStatusSink;
use gindex_runtime::{DbHandle, Runtime, RuntimeError};

/// Crawl drive-index mirrors into a local catalog and resolve download links.
#[derive(Parser, Debug)]
#[command(name = "gindex", version)]
struct Cli {
    /// Config file to use instead of the user config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl every configured root and reconcile the catalog
    Sync {
        /// Keep running, starting a new pass every SECS seconds
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
    },

    /// Print a signed download URL
    Url {
        kind: EntityArg,
        id: i64,
    },

    /// Print endpoint health and catalog counts as JSON
    Status,

    /// Run one of the name parsers and print its output as JSON
    Parse {
        kind: ParseKind,
        name: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EntityArg {
    Movie,
    Episode,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ParseKind {
    MovieFolder,
    AnimeFolder,
    ReleaseFolder,
    ReleaseFile,
    Episode,
    AnimeEpisode,
    Season,
    Size,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Parsing is pure; it needs neither config nor logs on disk.
    if let Command::Parse { kind, name } = &cli.command {
        println!("{}", parse_json(*kind, name));
        return ExitCode::SUCCESS;
    }

    let _guard = init_logging();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gindex=info"));
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let log_dir = AppConfig::log_dir();
    match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "gindex.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            tracing_subscriber::registry().with(console).with(file).init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry().with(console).init();
            tracing::warn!(dir = %log_dir.display(), error = %e, "file logging disabled");
            None
        }
    }
}

async fn run(cli: Cli) -> Result<(), RuntimeError> {
    let runtime = open_runtime(cli.config)?;

    match cli.command {
        Command::Sync { every: None } => {
            let report = runtime.run_sync().await?;
            print_json(&report);
        }
        Command::Sync { every: Some(secs) } => {
            let _sweeper = runtime.spawn_cache_sweeper();
            let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A failed pass is logged by the status sink; the next tick retries.
                        if let Ok(report) = runtime.run_sync().await {
                            print_json(&report);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("interrupted, stopping");
                        break;
                    }
                }
            }
        }
        Command::Url { kind, id } => {
            let key = match kind {
                EntityArg::Movie => EntityKey::movie(id),
                EntityArg::Episode => EntityKey::episode(id),
            };
            println!("{}", runtime.resolve_url(key).await?);
        }
        Command::Status => {
            let status = json!({
                "endpoints": runtime.endpoint_status(),
                "catalog": runtime.counts().await?,
            });
            print_json(&status);
        }
        Command::Parse { .. } => unreachable!("handled before the runtime starts"),
    }

    Ok(())
}

fn open_runtime(config_path: Option<PathBuf>) -> Result<Runtime, RuntimeError> {
    let Some(path) = config_path else {
        return Runtime::new();
    };
    let config = AppConfig::load_from(&path)?;
    let db = DbHandle::open(&AppConfig::ensure_db_path()?)?;
    Runtime::with_db(config, db, Arc::new(TracingStatusSink))
}

fn parse_json(kind: ParseKind, name: &str) -> serde_json::Value {
    let value = match kind {
        ParseKind::MovieFolder => serde_json::to_value(gindex_parse::parse_movie_folder(name)),
        ParseKind::AnimeFolder => serde_json::to_value(gindex_parse::parse_anime_folder(name)),
        ParseKind::ReleaseFolder => serde_json::to_value(gindex_parse::parse_release_folder(name)),
        ParseKind::ReleaseFile => serde_json::to_value(gindex_parse::parse_release_filename(name)),
        ParseKind::Episode => serde_json::to_value(gindex_parse::parse_episode_name(name)),
        ParseKind::AnimeEpisode => serde_json::to_value(gindex_parse::parse_anime_episode(name)),
        ParseKind::Season => Ok(json!(gindex_parse::parse_season_number(name))),
        ParseKind::Size => Ok(json!(gindex_parse::parse_file_size(name))),
    };
    value.unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::error!(error = %e, "could not serialize output"),
    }
}
