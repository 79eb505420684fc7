//! Manual debug mode command handlers
//!
//! Sessions freeze a profile snapshot; steps run in isolation inside a
//! session so prompts and processors can be iterated on one step at a time.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::Subcommand;
use colored::*;
use serde_json::{Map, Value};
use tracklab_client::TrackLabClient;
use tracklab_core::domain::manual::{
    ManualSession, ProcessorConfig, ProcessorConfigItem, ProcessorKind, ProcessorRunResult,
    PromptVersion, SessionStatus, StepRun, StepRunSummary,
};
use tracklab_core::domain::step::StepId;
use tracklab_core::dto::manual::{
    CreatePromptVersion, CreateSession, RateRun, RunStep, UpdateSession,
};
use tracklab_core::presentation::{describe_status_text, describe_step, format_duration};

use crate::config::Config;
use crate::id_resolver::{resolve_profile_id, resolve_run_id, resolve_session_id};
use crate::output;

/// Manual mode subcommands
#[derive(Subcommand)]
pub enum ManualCommands {
    /// Debug session management
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Show run counts and last status of every step in a session
    Steps {
        /// Session ID or unambiguous prefix
        session: String,
    },
    /// Run one step in isolation
    Run {
        /// Session ID or unambiguous prefix
        session: String,

        /// Step to run (B1..B8 or the full step name)
        step: StepId,

        /// Stored prompt version to use
        #[arg(long, conflicts_with = "prompt_file")]
        prompt_version: Option<uuid::Uuid>,

        /// File with a one-off prompt text
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// JSON file with the step input
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Call the real LLM instead of the mock
        #[arg(long)]
        live: bool,

        /// Skip preprocessors
        #[arg(long)]
        no_pre: bool,

        /// Skip postprocessors
        #[arg(long)]
        no_post: bool,
    },
    /// List the run history of a step
    Runs {
        /// Session ID or unambiguous prefix
        session: String,

        /// Step (B1..B8 or the full step name)
        step: StepId,
    },
    /// Show a run in full
    RunDetail {
        /// Session ID or unambiguous prefix
        session: String,

        /// Run ID or unambiguous prefix
        run: String,
    },
    /// Rate a run (1-5), or clear the rating
    Rate {
        /// Session ID or unambiguous prefix
        session: String,

        /// Run ID or unambiguous prefix
        run: String,

        /// Rating between 1 and 5; omit to clear
        #[arg(long)]
        rating: Option<u8>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Ask the LLM judge to evaluate a run
    Judge {
        /// Session ID or unambiguous prefix
        session: String,

        /// Run ID or unambiguous prefix
        run: String,

        /// Call the real LLM instead of the mock
        #[arg(long)]
        live: bool,
    },
    /// Prompt version management
    Prompt {
        #[command(subcommand)]
        command: PromptCommands,
    },
    /// Pre/post processor configuration
    Processor {
        #[command(subcommand)]
        command: ProcessorCommands,
    },
}

/// Session subcommands
#[derive(Subcommand)]
pub enum SessionCommands {
    /// Create a session over a profile snapshot
    Create {
        /// Profile ID or unambiguous prefix
        profile: String,

        /// Session name
        #[arg(short, long)]
        name: String,

        /// Session description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List sessions
    List {
        /// Only sessions with this status (active or archived)
        #[arg(long)]
        status: Option<String>,
    },
    /// Get session details
    Get {
        /// Session ID or unambiguous prefix
        id: String,
    },
    /// Archive a session
    Archive {
        /// Session ID or unambiguous prefix
        id: String,
    },
    /// Delete a session and all its runs
    Delete {
        /// Session ID or unambiguous prefix
        id: String,
    },
}

/// Prompt subcommands
#[derive(Subcommand)]
pub enum PromptCommands {
    /// Show the latest prompt version of every step
    List,
    /// List all versions of a step's prompt
    Versions {
        /// Step (B1..B8 or the full step name)
        step: StepId,
    },
    /// Store a new prompt version from a file
    Create {
        /// Step (B1..B8 or the full step name)
        step: StepId,

        /// File with the prompt text
        file: PathBuf,

        /// What changed in this version
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Make an earlier version current again
    Rollback {
        /// Step (B1..B8 or the full step name)
        step: StepId,

        /// Version number to restore
        version: u32,
    },
    /// Import the built-in prompts as baseline versions
    LoadBaseline,
}

/// Processor subcommands
#[derive(Subcommand)]
pub enum ProcessorCommands {
    /// List every registered processor
    List,
    /// Show the processor chain of a step in a session
    Get {
        /// Session ID or unambiguous prefix
        session: String,

        /// Step (B1..B8 or the full step name)
        step: StepId,
    },
    /// Replace the processor chain of a step from a JSON file
    Set {
        /// Session ID or unambiguous prefix
        session: String,

        /// Step (B1..B8 or the full step name)
        step: StepId,

        /// JSON file with a list of processor entries
        file: PathBuf,
    },
}

/// Handle manual mode commands
pub async fn handle_manual_command(command: ManualCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ManualCommands::Session { command } => handle_session_command(&client, command).await,
        ManualCommands::Steps { session } => steps_status(&client, &session).await,
        ManualCommands::Run {
            session,
            step,
            prompt_version,
            prompt_file,
            input_file,
            live,
            no_pre,
            no_post,
        } => {
            let custom_prompt = match prompt_file {
                Some(path) => Some(read_file(&path).await?),
                None => None,
            };
            let input_data = match input_file {
                Some(path) => Some(read_json_object(&path).await?),
                None => None,
            };
            let request = RunStep {
                prompt_version_id: prompt_version,
                custom_prompt,
                input_data,
                use_mock: !live,
                run_preprocessors: !no_pre,
                run_postprocessors: !no_post,
                ..RunStep::default()
            };
            run_step(&client, &session, step, &request).await
        }
        ManualCommands::Runs { session, step } => step_runs(&client, &session, step).await,
        ManualCommands::RunDetail { session, run } => run_detail(&client, &session, &run).await,
        ManualCommands::Rate {
            session,
            run,
            rating,
            notes,
        } => rate_run(&client, &session, &run, rating, notes).await,
        ManualCommands::Judge { session, run, live } => {
            judge_run(&client, &session, &run, !live).await
        }
        ManualCommands::Prompt { command } => handle_prompt_command(&client, command).await,
        ManualCommands::Processor { command } => {
            handle_processor_command(&client, command).await
        }
    }
}

// =============================================================================
// Sessions
// =============================================================================

async fn handle_session_command(client: &TrackLabClient, command: SessionCommands) -> Result<()> {
    match command {
        SessionCommands::Create {
            profile,
            name,
            description,
        } => {
            let profile_id = resolve_profile_id(client, &profile).await?;
            let session = client
                .create_session(CreateSession {
                    profile_id,
                    name,
                    description,
                })
                .await
                .context("Failed to create session")?;

            println!("{}", "✓ Session created".green().bold());
            print_session_details(&session);
        }
        SessionCommands::List { status } => {
            let status = status.as_deref().map(parse_session_status).transpose()?;
            let list = client.list_sessions(status).await?;

            if list.sessions.is_empty() {
                println!("{}", "No sessions found.".yellow());
            } else {
                println!("{}", format!("Found {} session(s):", list.total).bold());
                println!();
                for session in &list.sessions {
                    print_session_summary(session);
                }
            }
        }
        SessionCommands::Get { id } => {
            let session_id = resolve_session_id(client, &id).await?;
            let session = client.get_session(session_id).await?;
            print_session_details(&session);
        }
        SessionCommands::Archive { id } => {
            let session_id = resolve_session_id(client, &id).await?;
            let update = UpdateSession {
                status: Some(SessionStatus::Archived),
                ..UpdateSession::default()
            };
            let session = client.update_session(session_id, &update).await?;
            println!(
                "{}",
                format!("✓ Session '{}' archived", session.name).green()
            );
        }
        SessionCommands::Delete { id } => {
            let session_id = resolve_session_id(client, &id).await?;
            client.delete_session(session_id).await?;
            println!(
                "{}",
                format!("✓ Session {} deleted", session_id).green()
            );
        }
    }
    Ok(())
}

fn parse_session_status(input: &str) -> Result<SessionStatus> {
    match input.trim().to_ascii_lowercase().as_str() {
        "active" => Ok(SessionStatus::Active),
        "archived" => Ok(SessionStatus::Archived),
        other => Err(anyhow!(
            "Unknown session status '{}' (expected active or archived)",
            other
        )),
    }
}

// =============================================================================
// Step Runs
// =============================================================================

async fn steps_status(client: &TrackLabClient, session: &str) -> Result<()> {
    let session_id = resolve_session_id(client, session).await?;
    let status = client.steps_status(session_id).await?;

    println!("{}", format!("Steps of session {}:", session_id).bold());
    for step in StepId::ALL {
        let entry = status
            .steps
            .get(step.step_name())
            .or_else(|| status.steps.get(step.short_name()));
        match entry {
            Some(entry) => {
                let rating = entry
                    .last_rating
                    .map(|r| format!("  rated {}/5", r))
                    .unwrap_or_default();
                println!(
                    "  {} {:<3} {:<42} {} run(s){}",
                    output::glyph(describe_status_text(&entry.status)),
                    step.short_name().bold(),
                    step.description(),
                    entry.run_count,
                    rating.dimmed()
                );
            }
            None => println!(
                "  {} {:<3} {:<42} {}",
                "○".dimmed(),
                step.short_name().bold(),
                step.description(),
                "never run".dimmed()
            ),
        }
    }
    Ok(())
}

async fn run_step(client: &TrackLabClient, session: &str, step: StepId, request: &RunStep) -> Result<()> {
    let session_id = resolve_session_id(client, session).await?;

    println!(
        "{}",
        format!(
            "Running {} ({}){}...",
            step,
            step.description(),
            if request.use_mock { " with mock LLM" } else { "" }
        )
        .dimmed()
    );
    let run = client
        .run_step(session_id, step, request)
        .await
        .with_context(|| format!("Failed to run {}", step))?;

    print_run_details(&run, false);
    Ok(())
}

async fn step_runs(client: &TrackLabClient, session: &str, step: StepId) -> Result<()> {
    let session_id = resolve_session_id(client, session).await?;
    let runs = client.step_runs(session_id, step).await?;

    if runs.is_empty() {
        println!("{}", format!("{} has not been run in this session.", step).yellow());
        return Ok(());
    }

    println!("{}", format!("Runs of {}:", step).bold());
    for run in &runs {
        print_run_summary(run);
    }
    Ok(())
}

async fn run_detail(client: &TrackLabClient, session: &str, run: &str) -> Result<()> {
    let session_id = resolve_session_id(client, session).await?;
    let run_id = resolve_run_id(client, session_id, run).await?;
    let run = client.run_detail(session_id, run_id).await?;

    print_run_details(&run, true);
    Ok(())
}

async fn rate_run(
    client: &TrackLabClient,
    session: &str,
    run: &str,
    rating: Option<u8>,
    notes: Option<String>,
) -> Result<()> {
    let request = RateRun::new(rating, notes).map_err(|e| anyhow!(e))?;
    let session_id = resolve_session_id(client, session).await?;
    let run_id = resolve_run_id(client, session_id, run).await?;
    let run = client.rate_run(session_id, run_id, &request).await?;

    match run.user_rating {
        Some(rating) => println!(
            "{}",
            format!("✓ Run #{} rated {}/5", run.run_number, rating).green()
        ),
        None => println!(
            "{}",
            format!("✓ Rating of run #{} cleared", run.run_number).green()
        ),
    }
    Ok(())
}

async fn judge_run(client: &TrackLabClient, session: &str, run: &str, use_mock: bool) -> Result<()> {
    let session_id = resolve_session_id(client, session).await?;
    let run_id = resolve_run_id(client, session_id, run).await?;
    let run = client
        .judge_run(session_id, run_id, use_mock)
        .await
        .context("LLM judge failed")?;

    match &run.llm_judge_evaluation {
        Some(evaluation) => {
            println!("{}", format!("Judge evaluation of run #{}:", run.run_number).bold());
            print_map(evaluation, "  ");
        }
        None => println!("{}", "The judge returned no evaluation.".yellow()),
    }
    Ok(())
}

fn print_run_summary(run: &StepRunSummary) {
    let mut line = format!(
        "  {} #{:<3} {}",
        output::glyph(describe_status_text(&run.status)),
        run.run_number,
        run.id.to_string().dimmed()
    );
    if let Some(ms) = run.duration_ms {
        line.push_str(&format!("  {}", format_duration(ms / 1000.0)));
    }
    if let Some(tokens) = run.tokens_used {
        line.push_str(&format!("  {} tokens", tokens));
    }
    if let Some(rating) = run.user_rating {
        line.push_str(&format!("  rated {}/5", rating));
    }
    println!("{}", line);
}

fn print_run_details(run: &StepRun, full: bool) {
    println!("{}", format!("Run #{} of {}", run.run_number, run.step_name).bold());
    println!("  ID:       {}", run.id.to_string().cyan());
    println!("  Status:   {}", output::status(describe_step(run.status)));
    if let Some(ms) = run.duration_ms {
        println!("  Duration: {}", format_duration(ms / 1000.0));
    }
    if let Some(tokens) = run.tokens_used {
        println!("  Tokens:   {}", tokens);
    }
    if let Some(rating) = run.user_rating {
        println!("  Rating:   {}/5", rating);
    }
    if let Some(notes) = &run.user_notes {
        println!("  Notes:    {}", notes);
    }
    if let Some(error) = &run.parse_error {
        println!("  Parse error: {}", error.red());
    }

    print_processor_results("Preprocessors", run.preprocessor_results.as_deref());
    print_processor_results("Postprocessors", run.postprocessor_results.as_deref());

    if let Some(evaluation) = &run.auto_evaluation {
        println!("\n{}", "Auto evaluation:".bold());
        print_map(evaluation, "  ");
    }
    if let Some(evaluation) = &run.llm_judge_evaluation {
        println!("\n{}", "Judge evaluation:".bold());
        print_map(evaluation, "  ");
    }

    if let Some(result) = &run.parsed_result {
        println!("\n{}", "Result:".bold());
        match serde_json::to_string_pretty(result) {
            Ok(json) => println!("{}", json),
            Err(_) => print_map(result, "  "),
        }
    }

    if full {
        if let Some(prompt) = &run.rendered_prompt {
            println!("\n{}", "Prompt:".bold());
            println!("{}", prompt.dimmed());
        }
        if let Some(raw) = &run.raw_response {
            println!("\n{}", "Raw response:".bold());
            println!("{}", raw.dimmed());
        }
    }
}

fn print_processor_results(title: &str, results: Option<&[ProcessorRunResult]>) {
    let Some(results) = results.filter(|r| !r.is_empty()) else {
        return;
    };
    println!("\n{}", format!("{}:", title).bold());
    for result in results {
        let marker = if result.passed { "✓".green() } else { "✗".red() };
        let detail = result
            .error
            .as_deref()
            .or(result.message.as_deref())
            .unwrap_or_default();
        println!("  {} {:<32} {}", marker, result.name, detail.dimmed());
    }
}

fn print_map(map: &Map<String, Value>, indent: &str) {
    for (key, value) in map {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("{}{} {}", indent, format!("{}:", key).cyan(), value);
    }
}

fn print_session_summary(session: &ManualSession) {
    println!("  {} {}", "▸".cyan(), session.name.bold());
    println!("    ID:      {}", session.id.to_string().dimmed());
    println!("    Status:  {}", session_status(session.status));
    println!(
        "    Created: {}",
        session
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_session_details(session: &ManualSession) {
    println!("{}", "Session Details:".bold());
    println!("  ID:          {}", session.id.to_string().cyan());
    println!("  Name:        {}", session.name);
    if let Some(description) = &session.description {
        println!("  Description: {}", description);
    }
    println!("  Profile:     {}", session.profile_id.to_string().dimmed());
    println!("  Status:      {}", session_status(session.status));
    println!(
        "  Created:     {}",
        session.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:     {}",
        session.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Snapshot:    {} field(s)", session.profile_snapshot.len());
}

fn session_status(status: SessionStatus) -> ColoredString {
    match status {
        SessionStatus::Active => status.to_string().green(),
        SessionStatus::Archived => status.to_string().dimmed(),
    }
}

// =============================================================================
// Prompts
// =============================================================================

async fn handle_prompt_command(client: &TrackLabClient, command: PromptCommands) -> Result<()> {
    match command {
        PromptCommands::List => {
            let prompts = client.list_prompts().await?;
            if prompts.is_empty() {
                println!(
                    "{}",
                    "No prompts stored. Run `tracklab manual prompt load-baseline` first.".yellow()
                );
                return Ok(());
            }
            println!("{}", "Current prompts:".bold());
            for prompt in &prompts {
                let baseline = if prompt.is_baseline { "baseline" } else { "" };
                println!(
                    "  {:<26} v{:<4} {}",
                    prompt.step_name.bold(),
                    prompt.latest_version,
                    baseline.dimmed()
                );
            }
        }
        PromptCommands::Versions { step } => {
            let versions = client.prompt_versions(step).await?;
            if versions.is_empty() {
                println!("{}", format!("No prompt versions for {}.", step).yellow());
                return Ok(());
            }
            println!("{}", format!("Prompt versions of {}:", step).bold());
            for version in &versions {
                print_prompt_version(version);
            }
        }
        PromptCommands::Create {
            step,
            file,
            description,
        } => {
            let prompt_text = read_file(&file).await?;
            if prompt_text.trim().is_empty() {
                bail!("Prompt file {} is empty", file.display());
            }
            let version = client
                .create_prompt_version(
                    step,
                    &CreatePromptVersion {
                        prompt_text,
                        change_description: description,
                    },
                )
                .await?;
            println!(
                "{}",
                format!("✓ Stored {} prompt v{}", step, version.version).green()
            );
        }
        PromptCommands::Rollback { step, version } => {
            let restored = client.rollback_prompt(step, version).await?;
            println!(
                "{}",
                format!(
                    "✓ {} prompt rolled back to v{} (now v{})",
                    step, version, restored.version
                )
                .green()
            );
        }
        PromptCommands::LoadBaseline => {
            let loaded = client.load_baseline_prompts().await?;
            println!(
                "{}",
                format!("✓ Loaded {} baseline prompt(s)", loaded.len()).green()
            );
        }
    }
    Ok(())
}

fn print_prompt_version(version: &PromptVersion) {
    let mut line = format!(
        "  v{:<4} {}",
        version.version,
        version
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if version.is_baseline {
        line.push_str(&format!("  {}", "baseline".cyan()));
    }
    if let Some(description) = &version.change_description {
        line.push_str(&format!("  {}", description));
    }
    println!("{}", line);
}

// =============================================================================
// Processors
// =============================================================================

async fn handle_processor_command(client: &TrackLabClient, command: ProcessorCommands) -> Result<()> {
    match command {
        ProcessorCommands::List => {
            let processors = client.list_processors().await?;
            println!("{}", format!("Found {} processor(s):", processors.len()).bold());
            for processor in &processors {
                let kind = match processor.kind {
                    ProcessorKind::Pre => "pre ".cyan(),
                    ProcessorKind::Post => "post".magenta(),
                };
                println!("  {} {}", kind, processor.name.bold());
                println!("       {}", processor.description.dimmed());
                println!(
                    "       {}",
                    format!("steps: {}", processor.applicable_steps.join(", ")).dimmed()
                );
            }
        }
        ProcessorCommands::Get { session, step } => {
            let session_id = resolve_session_id(client, &session).await?;
            let config = client.processor_config(session_id, step).await?;
            print_processor_config(&config);
        }
        ProcessorCommands::Set {
            session,
            step,
            file,
        } => {
            let session_id = resolve_session_id(client, &session).await?;
            let content = read_file(&file).await?;
            let processors: Vec<ProcessorConfigItem> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            let config = client
                .set_processor_config(session_id, step, processors)
                .await?;
            println!("{}", "✓ Processor chain updated".green());
            print_processor_config(&config);
        }
    }
    Ok(())
}

fn print_processor_config(config: &ProcessorConfig) {
    println!("{}", format!("Processors of {}:", config.step_name).bold());
    if config.processors.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    let mut processors: Vec<&ProcessorConfigItem> = config.processors.iter().collect();
    processors.sort_by_key(|p| p.execution_order);
    for processor in processors {
        let state = if processor.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!(
            "  {:>2}. {:<5} {:<32} {}",
            processor.execution_order, processor.processor_type, processor.processor_name, state
        );
    }
}

// =============================================================================
// Files
// =============================================================================

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    let content = read_file(path).await?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_status() {
        assert_eq!(parse_session_status("active").unwrap(), SessionStatus::Active);
        assert_eq!(parse_session_status(" Archived ").unwrap(), SessionStatus::Archived);
        assert!(parse_session_status("deleted").is_err());
    }
}
