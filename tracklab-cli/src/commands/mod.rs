//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod health;
mod manual;
mod profile;
mod qa;
mod track;

pub use manual::ManualCommands;
pub use profile::ProfileCommands;
pub use qa::QaCommands;
pub use track::TrackCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Student profile management
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Track generation and inspection
    Track {
        #[command(subcommand)]
        command: TrackCommands,
    },
    /// QA stability reports
    Qa {
        #[command(subcommand)]
        command: QaCommands,
    },
    /// Manual debug mode: isolated step runs, prompts, processors
    Manual {
        #[command(subcommand)]
        command: ManualCommands,
    },
    /// Check backend health
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Profile { command } => profile::handle_profile_command(command, config).await,
        Commands::Track { command } => track::handle_track_command(command, config).await,
        Commands::Qa { command } => qa::handle_qa_command(command, config).await,
        Commands::Manual { command } => manual::handle_manual_command(command, config).await,
        Commands::Health => health::handle_health_command(config).await,
    }
}
