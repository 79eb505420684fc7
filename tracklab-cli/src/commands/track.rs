//! Track command handlers
//!
//! Starts single and batch generations, follows them live and inspects
//! the generated tracks.

use std::io;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use colored::*;
use tracing::info;
use tracklab_client::{ProgressStream, TrackLabClient};
use tracklab_core::domain::track::{FieldUsage, FieldUsageItem, StepLog, Track, TrackSummary};
use tracklab_core::dto::track::{MAX_BATCH_SIZE, MIN_BATCH_SIZE};
use tracklab_core::presentation::{describe_track_status, format_duration};
use tracklab_core::progress::{BatchPhase, BatchProgress, JobPhase, JobProgress};
use uuid::Uuid;

use crate::config::Config;
use crate::id_resolver::{resolve_profile_id, resolve_track_id};
use crate::output;
use crate::view::{
    ClientCanceller, FollowOutcome, follow_batch, follow_job, interrupt_channel,
};

/// Track subcommands
#[derive(Subcommand)]
pub enum TrackCommands {
    /// Generate a track (or a batch of tracks) from a profile
    Generate {
        /// Profile ID or unambiguous prefix
        profile: String,

        /// Generate this many tracks in one batch (2-5)
        #[arg(short, long)]
        batch: Option<usize>,

        /// Return as soon as generation has started
        #[arg(long)]
        no_follow: bool,
    },
    /// Follow the progress of a running generation
    Watch {
        /// Track ID or unambiguous prefix
        id: String,
    },
    /// Follow the progress of a running batch
    WatchBatch {
        /// Batch ID
        batch_id: Uuid,

        /// Track IDs or prefixes in batch order
        #[arg(long, value_delimiter = ',', required_unless_present = "count")]
        tracks: Vec<String>,

        /// Number of tracks, when their IDs are unknown (disables cancel)
        #[arg(long, conflicts_with = "tracks")]
        count: Option<usize>,
    },
    /// Request cancellation of a running generation
    Cancel {
        /// Track ID or unambiguous prefix
        id: String,
    },
    /// List tracks
    List {
        /// Only tracks generated from this profile
        #[arg(long)]
        profile: Option<String>,

        /// Only tracks with this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Get track details
    Get {
        /// Track ID or unambiguous prefix
        id: String,

        /// Print the generated track data as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-step generation logs
    Logs {
        /// Track ID or unambiguous prefix
        id: String,
    },
    /// Show which profile fields the pipeline used
    FieldUsage {
        /// Track ID or unambiguous prefix
        id: String,
    },
    /// Print the download URL of a track export
    ExportUrl {
        /// Track ID or unambiguous prefix
        id: String,
    },
}

/// Handle track commands
pub async fn handle_track_command(command: TrackCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        TrackCommands::Generate {
            profile,
            batch,
            no_follow,
        } => generate(&client, config, &profile, batch, !no_follow).await,
        TrackCommands::Watch { id } => watch_track(&client, config, &id).await,
        TrackCommands::WatchBatch {
            batch_id,
            tracks,
            count,
        } => watch_batch(&client, config, batch_id, &tracks, count).await,
        TrackCommands::Cancel { id } => cancel_track(&client, &id).await,
        TrackCommands::List { profile, status } => {
            list_tracks(&client, profile.as_deref(), status.as_deref()).await
        }
        TrackCommands::Get { id, json } => get_track(&client, &id, json).await,
        TrackCommands::Logs { id } => track_logs(&client, &id).await,
        TrackCommands::FieldUsage { id } => field_usage(&client, &id).await,
        TrackCommands::ExportUrl { id } => {
            let track_id = resolve_track_id(&client, &id).await?;
            println!("{}", client.track_export_url(track_id));
            Ok(())
        }
    }
}

// =============================================================================
// Generation
// =============================================================================

async fn generate(
    client: &TrackLabClient,
    config: &Config,
    profile: &str,
    batch: Option<usize>,
    follow: bool,
) -> Result<()> {
    let profile_id = resolve_profile_id(client, profile).await?;

    match batch {
        Some(size) => {
            let started = client
                .generate_batch(profile_id, size)
                .await
                .context("Failed to start batch generation")?;
            info!(batch_id = %started.batch_id, tracks = started.track_ids.len(), "Batch generation started");

            println!("{}", "✓ Batch generation started".green().bold());
            println!("  Batch:  {}", started.batch_id.to_string().cyan());
            for (index, track_id) in started.track_ids.iter().enumerate() {
                println!("  #{}     {}", index + 1, track_id.to_string().dimmed());
            }

            if follow {
                let feed = client.progress_at(&started.progress_url, config.stream_options());
                let batch = BatchProgress::with_limits(
                    started.batch_id,
                    started.track_ids,
                    config.limits(),
                );
                follow_batch_feed(client, feed, batch).await?;
            }
        }
        None => {
            let started = client
                .generate_track(profile_id)
                .await
                .context("Failed to start generation")?;
            info!(track_id = %started.track_id, "Generation started");

            println!("{}", "✓ Generation started".green().bold());
            println!("  Track: {}", started.track_id.to_string().cyan());

            if follow {
                let feed = client.progress_at(&started.progress_url, config.stream_options());
                follow_job_feed(client, config, started.track_id, feed).await?;
            }
        }
    }

    if !follow {
        println!(
            "{}",
            "  Use `tracklab track watch <id>` to follow progress".dimmed()
        );
    }
    Ok(())
}

async fn watch_track(client: &TrackLabClient, config: &Config, id: &str) -> Result<()> {
    let track_id = resolve_track_id(client, id).await?;
    let track = client.get_track(track_id).await?;

    if track.status.is_final() {
        println!(
            "{}",
            format!("Track {} already finished.", track_id).yellow()
        );
        print_track_details(&track);
        return Ok(());
    }

    let feed = client.track_progress(track_id, config.stream_options());
    follow_job_feed(client, config, track_id, feed).await
}

async fn watch_batch(
    client: &TrackLabClient,
    config: &Config,
    batch_id: Uuid,
    tracks: &[String],
    count: Option<usize>,
) -> Result<()> {
    let track_ids = match count {
        Some(count) => placeholder_ids(count)?,
        None => {
            let mut ids = Vec::with_capacity(tracks.len());
            for track in tracks {
                ids.push(resolve_track_id(client, track).await?);
            }
            ids
        }
    };

    let feed = client.batch_progress(batch_id, config.stream_options());
    let batch = BatchProgress::with_limits(batch_id, track_ids, config.limits());
    follow_batch_feed(client, feed, batch).await
}

/// Nil ids for a batch whose track ids are unknown
///
/// Cancel requests cannot be sent for these tracks.
fn placeholder_ids(count: usize) -> Result<Vec<Uuid>> {
    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&count) {
        bail!(
            "A batch has {} to {} tracks, got {}",
            MIN_BATCH_SIZE,
            MAX_BATCH_SIZE,
            count
        );
    }
    Ok(vec![Uuid::nil(); count])
}

async fn follow_job_feed(
    client: &TrackLabClient,
    config: &Config,
    track_id: Uuid,
    mut feed: ProgressStream,
) -> Result<()> {
    let mut job = JobProgress::with_limits(config.limits());
    let canceller = ClientCanceller::new(client.clone());
    let mut interrupts = interrupt_channel();
    let mut stdout = io::stdout();

    let outcome = follow_job(
        track_id,
        &mut feed,
        &mut job,
        &canceller,
        &mut interrupts,
        &mut stdout,
    )
    .await?;

    match (outcome, job.phase()) {
        (FollowOutcome::Detached, _) => {
            println!(
                "{}",
                format!("  Resume with `tracklab track watch {}`", track_id).dimmed()
            );
            Ok(())
        }
        (FollowOutcome::FeedEnded, _) => bail!("Progress stream ended unexpectedly"),
        (_, JobPhase::Errored { message, .. }) => bail!("Generation failed: {}", message),
        _ => Ok(()),
    }
}

async fn follow_batch_feed(
    client: &TrackLabClient,
    mut feed: ProgressStream,
    mut batch: BatchProgress,
) -> Result<()> {
    let canceller = ClientCanceller::new(client.clone());
    let mut interrupts = interrupt_channel();
    let mut stdout = io::stdout();

    let outcome = follow_batch(&mut batch, &mut feed, &canceller, &mut interrupts, &mut stdout).await?;

    match (outcome, batch.phase()) {
        (FollowOutcome::Detached, _) => Ok(()),
        (FollowOutcome::FeedEnded, _) => bail!("Progress stream ended unexpectedly"),
        (_, BatchPhase::Errored { message }) => bail!("Batch failed: {}", message),
        _ => Ok(()),
    }
}

async fn cancel_track(client: &TrackLabClient, id: &str) -> Result<()> {
    let track_id = resolve_track_id(client, id).await?;
    let ack = client.cancel_track(track_id).await?;

    println!(
        "{} {}",
        "✓ Cancel requested:".green().bold(),
        ack.status
    );
    println!(
        "{}",
        "  The generation stops after its current step.".dimmed()
    );
    Ok(())
}

// =============================================================================
// Inspection
// =============================================================================

async fn list_tracks(client: &TrackLabClient, profile: Option<&str>, status: Option<&str>) -> Result<()> {
    let profile_id = match profile {
        Some(profile) => Some(resolve_profile_id(client, profile).await?),
        None => None,
    };
    let tracks = client.list_tracks(profile_id, status).await?;

    if tracks.is_empty() {
        println!("{}", "No tracks found.".yellow());
    } else {
        println!("{}", format!("Found {} track(s):", tracks.len()).bold());
        println!();
        for track in tracks {
            print_track_summary(&track);
        }
    }

    Ok(())
}

async fn get_track(client: &TrackLabClient, id: &str, json: bool) -> Result<()> {
    let track_id = resolve_track_id(client, id).await?;
    let track = client.get_track(track_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&track.track_data)?);
    } else {
        print_track_details(&track);
    }

    Ok(())
}

async fn track_logs(client: &TrackLabClient, id: &str) -> Result<()> {
    let track_id = resolve_track_id(client, id).await?;
    let logs = client.track_logs(track_id).await?;

    if logs.is_empty() {
        println!("{}", "No logs found for this track.".yellow());
        return Ok(());
    }

    println!("{}", format!("Logs for track {}:", track_id).bold());
    println!("{}", output::rule());
    for log in &logs {
        print_step_log(log);
    }
    println!("{}", output::rule());

    Ok(())
}

async fn field_usage(client: &TrackLabClient, id: &str) -> Result<()> {
    let track_id = resolve_track_id(client, id).await?;
    let usage = client.field_usage(track_id).await?;

    print_field_usage(&usage);
    Ok(())
}

fn print_track_summary(track: &TrackSummary) {
    println!(
        "  {} {}",
        "▸".cyan(),
        track.topic.as_deref().unwrap_or("(untitled)").bold()
    );
    println!("    ID:       {}", track.id.to_string().dimmed());
    println!(
        "    Status:   {}",
        output::status(describe_track_status(track.status))
    );
    if let Some(duration) = track.generation_duration_sec {
        println!("    Duration: {}", format_duration(duration));
    }
    println!(
        "    Created:  {}",
        track
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_track_details(track: &Track) {
    println!("{}", "Track Details:".bold());
    println!("  ID:        {}", track.id.to_string().cyan());
    println!("  Profile:   {}", track.profile_id.to_string().dimmed());
    println!(
        "  Status:    {}",
        output::status(describe_track_status(track.status))
    );
    println!("  Algorithm: {}", track.algorithm_version);
    if let Some(index) = track.batch_index {
        println!("  Batch:     #{}", index + 1);
    }
    if let Some(report) = track.qa_report_id {
        println!("  QA report: {}", report.to_string().dimmed());
    }
    println!(
        "  Created:   {}",
        track.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(duration) = track.generation_duration_sec {
        println!("  Duration:  {}", format_duration(duration));
    }
    if let Some(meta) = &track.generation_metadata {
        println!("  LLM calls: {}", meta.llm_calls_count);
        println!("  Tokens:    {}", meta.total_tokens);
    }
    if let Some(error) = &track.error_message {
        println!("  Error:     {}", error.red());
    }

    let artifacts = track.artifacts();
    println!("\n{}", "Artifacts:".bold());
    if let Some(set) = &artifacts.competency_set {
        println!("  Competencies:   {}", set.competencies.len());
    }
    if let Some(ksa) = &artifacts.ksa_matrix {
        println!(
            "  KSA matrix:     {} knowledge, {} skills, {} habits",
            ksa.knowledge_items.len(),
            ksa.skill_items.len(),
            ksa.habit_items.len()
        );
    }
    if let Some(units) = &artifacts.learning_units {
        println!(
            "  Learning units: {} theory, {} practice, {} automation in {} clusters",
            units.theory_units.len(),
            units.practice_units.len(),
            units.automation_units.len(),
            units.clusters.len()
        );
    }
    if let Some(hierarchy) = &artifacts.hierarchy {
        println!(
            "  Hierarchy:      {} levels, {} weeks",
            hierarchy.levels.len(),
            hierarchy.total_weeks
        );
    }
    if let Some(blueprints) = &artifacts.lesson_blueprints {
        println!("  Blueprints:     {}", blueprints.blueprints.len());
    }
    if let Some(schedule) = &artifacts.schedule {
        println!(
            "  Schedule:       {} weeks, {} checkpoints",
            schedule.weeks.len(),
            schedule.checkpoints.len()
        );
    }
    if let Some(validation) = &artifacts.validation {
        let verdict = if validation.overall_valid {
            "valid".green()
        } else {
            "invalid".red()
        };
        println!(
            "  Validation:     {} ({} critical, {} warnings)",
            verdict, validation.critical_failures, validation.warnings
        );
        for check in validation.checks.iter().filter(|c| !c.passed) {
            println!("    {} {}: {}", "✗".red(), check.check_name, check.message);
        }
    }
}

fn print_step_log(log: &StepLog) {
    let marker = if log.error_message.is_some() {
        "✗".red()
    } else {
        "✓".green()
    };
    println!(
        "{} {:<28} {:>8} {}",
        marker,
        log.step_name.bold(),
        format_duration(log.step_duration_sec),
        format!("{} LLM call(s)", log.llm_calls.len()).dimmed()
    );
    if let Some(error) = &log.error_message {
        println!("    {}", error.red());
    }
}

fn print_field_usage(usage: &FieldUsage) {
    println!(
        "{}",
        format!(
            "Field usage: {}/{} profile fields used",
            usage.used_count, usage.total_fields
        )
        .bold()
    );
    if usage.critical_unused_count > 0 {
        println!(
            "  {}",
            format!("{} critical field(s) unused", usage.critical_unused_count).red()
        );
    }
    if usage.important_unused_count > 0 {
        println!(
            "  {}",
            format!("{} important field(s) unused", usage.important_unused_count).yellow()
        );
    }

    println!("\n{}", "Used:".bold());
    for field in &usage.used_fields {
        println!(
            "  {} {:<28} {}",
            "✓".green(),
            field.field_name,
            field.steps.join(", ").dimmed()
        );
    }

    if !usage.unused_fields.is_empty() {
        println!("\n{}", "Unused:".bold());
        for field in &usage.unused_fields {
            println!("  {} {:<28} {}", "○".dimmed(), field.field_name, criticality(field));
        }
    }
}

fn criticality(field: &FieldUsageItem) -> ColoredString {
    match field.criticality.as_str() {
        "CRITICAL" => field.criticality.red(),
        "IMPORTANT" => field.criticality.yellow(),
        _ => field.criticality.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_ids_respect_batch_limits() {
        let ids = placeholder_ids(3).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(Uuid::is_nil));

        assert!(placeholder_ids(0).is_err());
        assert!(placeholder_ids(1).is_err());
        assert!(placeholder_ids(1234).is_err());
    }

    #[test]
    fn test_numeric_tracks_value_is_an_id_prefix() {
        use clap::Parser;

        #[derive(Parser)]
        struct Cli {
            #[command(subcommand)]
            command: TrackCommands,
        }

        let batch_id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["track", "watch-batch", &batch_id, "--tracks", "1234"]).unwrap();
        match cli.command {
            TrackCommands::WatchBatch { tracks, count, .. } => {
                assert_eq!(tracks, vec!["1234".to_string()]);
                assert_eq!(count, None);
            }
            _ => panic!("expected watch-batch"),
        }

        assert!(
            Cli::try_parse_from(["track", "watch-batch", &batch_id, "--count", "2", "--tracks", "ab"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["track", "watch-batch", &batch_id]).is_err());
    }
}
