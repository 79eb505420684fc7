//! Profile command handlers
//!
//! Upload, list and inspect student profiles, and edit them offline as
//! form JSON files that are validated before they reach the backend.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use colored::*;
use tracklab_client::TrackLabClient;
use tracklab_core::domain::profile::{Profile, ProfileSummary, ValidationResult};
use tracklab_core::presentation::describe_status_text;
use tracklab_core::profile_form::{FieldError, ProfileForm};

use crate::config::Config;
use crate::id_resolver::resolve_profile_id;
use crate::output;

/// Profile subcommands
#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Upload a profile JSON file as-is
    Upload {
        /// Path to the profile JSON file
        file: PathBuf,
    },
    /// List all profiles
    List,
    /// Get profile details
    Get {
        /// Profile ID or unambiguous prefix
        id: String,

        /// Print the stored profile data as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a profile from a form file, after local validation
    Create {
        /// Path to the profile form JSON file
        file: PathBuf,
    },
    /// Replace a profile with a form file, after local validation
    Update {
        /// Profile ID or unambiguous prefix
        id: String,

        /// Path to the profile form JSON file
        file: PathBuf,
    },
    /// Validate a form file without contacting the backend
    Validate {
        /// Path to the profile form JSON file
        file: PathBuf,
    },
    /// Start a new empty form file
    Init {
        /// Path of the form file to create
        file: PathBuf,
    },
    /// Change a form file in place
    Edit {
        /// Path to the profile form JSON file
        file: PathBuf,

        #[command(subcommand)]
        change: FormEdit,
    },
    /// Export a stored profile as an editable form file
    Export {
        /// Profile ID or unambiguous prefix
        id: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the most recent track generated from a profile
    LastTrack {
        /// Profile ID or unambiguous prefix
        id: String,
    },
}

/// Changes applied to a form file by `profile edit`
#[derive(Subcommand)]
pub enum FormEdit {
    /// Set the experience level (zero, beginner, intermediate, advanced)
    Level { level: String },
    /// Add a target task
    AddTask { description: String },
    /// Remove a task and every selection of it
    RemoveTask { id: String },
    /// Add a subtask under an existing task
    AddSubtask { parent: String, description: String },
    /// Add a key barrier
    AddBarrier { description: String },
    /// Add a confusing concept
    AddConcept { term: String },
    /// Add a success criterion
    AddCriterion { description: String },
}

/// Handle profile commands
pub async fn handle_profile_command(command: ProfileCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ProfileCommands::Upload { file } => upload_profile(&client, &file).await,
        ProfileCommands::List => list_profiles(&client).await,
        ProfileCommands::Get { id, json } => get_profile(&client, &id, json).await,
        ProfileCommands::Create { file } => create_profile(&client, &file).await,
        ProfileCommands::Update { id, file } => update_profile(&client, &id, &file).await,
        ProfileCommands::Validate { file } => validate_profile(&file).await,
        ProfileCommands::Init { file } => init_form(&file).await,
        ProfileCommands::Edit { file, change } => edit_form(&file, &change).await,
        ProfileCommands::Export { id, output } => export_profile(&client, &id, output).await,
        ProfileCommands::LastTrack { id } => last_track(&client, &id).await,
    }
}

async fn upload_profile(client: &TrackLabClient, file: &Path) -> Result<()> {
    let uploaded = client
        .upload_profile(file)
        .await
        .with_context(|| format!("Failed to upload {}", file.display()))?;

    println!("{}", "✓ Profile uploaded".green().bold());
    println!("  ID:    {}", uploaded.id.to_string().cyan());
    println!("  Topic: {}", uploaded.topic);
    if let Some(level) = &uploaded.experience_level {
        println!("  Level: {}", level);
    }
    print_validation(&uploaded.validation_result);

    Ok(())
}

async fn list_profiles(client: &TrackLabClient) -> Result<()> {
    let profiles = client.list_profiles().await?;

    if profiles.is_empty() {
        println!("{}", "No profiles found.".yellow());
    } else {
        println!("{}", format!("Found {} profile(s):", profiles.len()).bold());
        println!();
        for profile in profiles {
            print_profile_summary(&profile);
        }
    }

    Ok(())
}

async fn get_profile(client: &TrackLabClient, id: &str, json: bool) -> Result<()> {
    let profile_id = resolve_profile_id(client, id).await?;
    let profile = client.get_profile(profile_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile.data)?);
    } else {
        print_profile_details(&profile);
    }

    Ok(())
}

async fn create_profile(client: &TrackLabClient, file: &Path) -> Result<()> {
    let form = load_valid_form(file).await?;
    let saved = client.create_profile(&form).await?;

    println!("{}", "✓ Profile created".green().bold());
    println!("  ID:    {}", saved.id.to_string().cyan());
    println!("  Topic: {}", saved.topic);
    print_validation(&saved.validation_result);

    Ok(())
}

async fn update_profile(client: &TrackLabClient, id: &str, file: &Path) -> Result<()> {
    let profile_id = resolve_profile_id(client, id).await?;
    let form = load_valid_form(file).await?;
    let saved = client.update_profile(profile_id, &form).await?;

    println!("{}", "✓ Profile updated".green().bold());
    println!("  ID:    {}", saved.id.to_string().cyan());
    println!("  Topic: {}", saved.topic);
    print_validation(&saved.validation_result);

    Ok(())
}

async fn validate_profile(file: &Path) -> Result<()> {
    let form = load_form(file).await?;
    let errors = form.validate();

    if errors.is_empty() {
        println!("{}", "✓ Profile form is valid".green().bold());
        return Ok(());
    }

    print_field_errors(&errors);
    bail!("Profile form has {} problem(s)", errors.len())
}

async fn init_form(file: &Path) -> Result<()> {
    if tokio::fs::try_exists(file).await.unwrap_or(false) {
        bail!("{} already exists", file.display());
    }
    save_form(file, &ProfileForm::new()).await?;
    println!(
        "{}",
        format!("✓ Empty profile form written to {}", file.display()).green()
    );
    Ok(())
}

async fn edit_form(file: &Path, change: &FormEdit) -> Result<()> {
    let mut form = load_form(file).await?;
    let summary = apply_edit(&mut form, change)?;
    save_form(file, &form).await?;

    println!("{} {}", "✓".green(), summary);
    let remaining = form.validate().len();
    if remaining > 0 {
        println!(
            "{}",
            format!("  {} problem(s) left; run `tracklab profile validate`", remaining).dimmed()
        );
    }
    Ok(())
}

/// Apply one edit and describe what changed
fn apply_edit(form: &mut ProfileForm, change: &FormEdit) -> Result<String> {
    let summary = match change {
        FormEdit::Level { level } => {
            form.set_experience_level(level.trim());
            let mode = if form.novice_mode { "on" } else { "off" };
            format!("Experience level set to {} (novice mode {})", form.experience_level, mode)
        }
        FormEdit::AddTask { description } => format!("Added task {}", form.add_task(description.as_str())),
        FormEdit::RemoveTask { id } => {
            if !form.remove_task(id) {
                bail!("No task with id '{}'", id);
            }
            format!("Removed task {}", id)
        }
        FormEdit::AddSubtask { parent, description } => {
            if !form.target_tasks.iter().any(|t| &t.id == parent) {
                bail!("No task with id '{}'", parent);
            }
            format!("Added subtask {}", form.add_subtask(parent, description.as_str()))
        }
        FormEdit::AddBarrier { description } => {
            format!("Added barrier {}", form.add_barrier(description.as_str()))
        }
        FormEdit::AddConcept { term } => format!("Added concept {}", form.add_concept(term.as_str())),
        FormEdit::AddCriterion { description } => {
            format!("Added criterion {}", form.add_criterion(description.as_str()))
        }
    };
    Ok(summary)
}

async fn save_form(file: &Path, form: &ProfileForm) -> Result<()> {
    tokio::fs::write(file, form.to_json_pretty()?)
        .await
        .with_context(|| format!("Failed to write {}", file.display()))
}

async fn export_profile(client: &TrackLabClient, id: &str, output: Option<PathBuf>) -> Result<()> {
    let profile_id = resolve_profile_id(client, id).await?;
    let profile = client.get_profile(profile_id).await?;

    let data = serde_json::to_string(&profile.data)?;
    let form = ProfileForm::from_json(&data).context("Stored profile is not a valid form")?;
    let json = form.to_json_pretty()?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{}",
                format!("✓ Profile exported to {}", path.display()).green()
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}

async fn last_track(client: &TrackLabClient, id: &str) -> Result<()> {
    let profile_id = resolve_profile_id(client, id).await?;

    match client.last_track(profile_id).await? {
        Some(track) => {
            println!("{}", "Last Track:".bold());
            println!("  ID:      {}", track.track_id.to_string().cyan());
            println!("  Status:  {}", output::status(describe_status_text(&track.status)));
            println!(
                "  Created: {}",
                track.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        None => println!("{}", "No tracks generated for this profile yet.".yellow()),
    }

    Ok(())
}

async fn load_form(file: &Path) -> Result<ProfileForm> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    ProfileForm::from_json(&content).with_context(|| format!("Failed to parse {}", file.display()))
}

/// Load a form and refuse to continue while it has blocking problems
async fn load_valid_form(file: &Path) -> Result<ProfileForm> {
    let form = load_form(file).await?;
    let errors = form.validate();
    if !errors.is_empty() {
        print_field_errors(&errors);
        bail!(
            "Profile form has {} problem(s); fix them before saving",
            errors.len()
        );
    }
    Ok(form)
}

fn print_field_errors(errors: &[FieldError]) {
    println!(
        "{}",
        format!("✗ {} problem(s) found:", errors.len()).red().bold()
    );
    for error in errors {
        println!("  {} {}", error.field.cyan(), error.message);
    }
}

fn print_validation(result: &ValidationResult) {
    if result.valid {
        println!("  Valid: {}", "yes".green());
    } else {
        println!("  Valid: {}", "no".red());
    }
    for error in &result.errors {
        println!("    {} {}", "✗".red(), error);
    }
    for warning in &result.warnings {
        println!("    {} {}", "!".yellow(), warning);
    }
}

fn print_profile_summary(profile: &ProfileSummary) {
    let name = profile.profile_name.as_deref().unwrap_or(&profile.topic);

    println!("  {} {}", "▸".cyan(), name.bold());
    println!("    ID:      {}", profile.id.to_string().dimmed());
    println!("    File:    {}", profile.filename);
    if let Some(level) = &profile.experience_level {
        println!("    Level:   {}", level);
    }
    println!(
        "    Created: {}",
        profile
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_profile_details(profile: &Profile) {
    println!("{}", "Profile Details:".bold());
    println!("  ID:       {}", profile.id.to_string().cyan());
    println!("  Topic:    {}", profile.topic);
    println!("  File:     {}", profile.filename);
    if let Some(level) = &profile.experience_level {
        println!("  Level:    {}", level);
    }
    println!(
        "  Created:  {}",
        profile.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:  {}",
        profile.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Fields:   {}", profile.data.len());
    print_validation(&profile.validation_result);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(form: &mut ProfileForm, change: FormEdit) -> String {
        apply_edit(form, &change).unwrap()
    }

    #[test]
    fn test_edits_allocate_ids_past_loaded_ones() {
        let mut form = ProfileForm::from_json(
            r#"{"target_tasks": [{"id": "t3", "description": "Write joins", "complexity_rank": 1}]}"#,
        )
        .unwrap();

        let added = edit(&mut form, FormEdit::AddTask { description: "Tune indexes".to_string() });
        assert_eq!(added, "Added task t4");
        let added = edit(
            &mut form,
            FormEdit::AddSubtask {
                parent: "t4".to_string(),
                description: "Read query plans".to_string(),
            },
        );
        assert_eq!(added, "Added subtask st1");
        assert_eq!(form.subtasks[0].parent_task_id, "t4");
    }

    #[test]
    fn test_level_edit_toggles_novice_mode() {
        let mut form = ProfileForm::new();
        let summary = edit(&mut form, FormEdit::Level { level: "beginner".to_string() });
        assert!(form.novice_mode);
        assert!(summary.contains("novice mode on"));

        edit(&mut form, FormEdit::Level { level: "advanced".to_string() });
        assert!(!form.novice_mode);
    }

    #[test]
    fn test_edits_reject_unknown_tasks() {
        let mut form = ProfileForm::new();
        assert!(apply_edit(&mut form, &FormEdit::RemoveTask { id: "t9".to_string() }).is_err());
        assert!(
            apply_edit(
                &mut form,
                &FormEdit::AddSubtask {
                    parent: "t9".to_string(),
                    description: "orphan".to_string(),
                },
            )
            .is_err()
        );
        assert!(form.subtasks.is_empty());
    }

    #[test]
    fn test_remove_task_clears_selection() {
        let mut form = ProfileForm::new();
        edit(&mut form, FormEdit::AddTask { description: "Model data".to_string() });
        form.peak_task_id = "t1".to_string();

        assert_eq!(edit(&mut form, FormEdit::RemoveTask { id: "t1".to_string() }), "Removed task t1");
        assert!(form.target_tasks.is_empty());
        assert!(form.peak_task_id.is_empty());
    }

    #[test]
    fn test_barrier_and_criterion_edits() {
        let mut form = ProfileForm::new();
        edit(&mut form, FormEdit::AddTask { description: "Model data".to_string() });
        assert_eq!(
            edit(&mut form, FormEdit::AddBarrier { description: "No schema practice".to_string() }),
            "Added barrier b1"
        );
        assert_eq!(form.key_barriers[0].related_task_id, "t1");
        assert_eq!(
            edit(&mut form, FormEdit::AddConcept { term: "normal forms".to_string() }),
            "Added concept c1"
        );
        assert_eq!(
            edit(&mut form, FormEdit::AddCriterion { description: "Ships a schema".to_string() }),
            "Added criterion sc1"
        );
    }
}
