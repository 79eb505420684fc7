//! TrackLab CLI
//!
//! Terminal console for the learning-track generation backend: manage
//! profiles, start single or batch generation and watch it step by step,
//! read QA reports and drive the manual debug mode.

mod commands;
mod config;
mod id_resolver;
mod output;
mod types;
mod view;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tracklab")]
#[command(about = "TrackLab learning-track generation console", long_about = None)]
struct Cli {
    /// Backend URL
    #[arg(long, env = "TRACKLAB_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Consecutive stream failures tolerated before a job is marked errored
    #[arg(long, env = "TRACKLAB_MAX_TRANSPORT_FAILURES", default_value_t = 3)]
    max_transport_failures: u32,

    /// Pause before reconnecting a dropped progress stream, in milliseconds
    #[arg(long, env = "TRACKLAB_RECONNECT_DELAY_MS", default_value_t = 1000)]
    reconnect_delay_ms: u64,

    /// Seconds a cancel request blocks further cancel attempts
    #[arg(long, env = "TRACKLAB_CANCEL_WINDOW_SECS", default_value_t = 10)]
    cancel_window_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays the console output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracklab=info,tracklab_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        api_url: cli.api_url,
        max_transport_failures: cli.max_transport_failures,
        reconnect_delay: Duration::from_millis(cli.reconnect_delay_ms),
        cancel_window: Duration::from_secs(cli.cancel_window_secs),
    };
    config.validate()?;

    handle_command(cli.command, &config).await
}
