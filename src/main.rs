//! FeedbackJar API Server
//!
//! Run with: cargo run --bin feedbackjar -- --config config.toml
//!
//! # Configuration
//!
//! Without `--config` the first file found among the default locations is
//! used (see [`Config::load_default`]). Environment variables override file
//! settings:
//! - `FEEDBACKJAR_DATABASE_PATH`: SQLite database file
//! - `FEEDBACKJAR_API_HOST` / `FEEDBACKJAR_API_PORT`: Bind address
//! - `FEEDBACKJAR_TIME_RANGE_POLICY`: `strict` or `legacy_fallback`
//! - `FEEDBACKJAR_LOG_LEVEL` / `FEEDBACKJAR_LOG_FORMAT`: Logging
//! - `RUST_LOG`: Full filter directive, wins over the log level

use anyhow::Context;
use clap::Parser;
use feedbackjar::api::{serve, AppState};
use feedbackjar::config::{Config, LoggingConfig};
use feedbackjar::storage::Database;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "feedbackjar")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "FeedbackJar analytics API server")]
struct Args {
    /// Path to a config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {:?}", path))?,
        None => Config::load_default(),
    };

    init_tracing(&config.logging);

    tracing::info!("Starting FeedbackJar API server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Database: {:?}", config.storage.database_path);
    tracing::info!("Time range policy: {:?}", config.query.time_range_policy);

    let database = Database::open(&config.storage).context("opening database")?;

    let state = AppState::new(database, config.api.clone(), config.query.time_range_policy);
    serve(state, &config.api).await?;

    tracing::info!("FeedbackJar API server stopped");
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level applies to this crate
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("feedbackjar={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
