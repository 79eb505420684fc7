//! QA report command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use tracklab_client::TrackLabClient;
use tracklab_core::domain::qa::{QaReport, QaReportData, QaReportSummary};
use tracklab_core::presentation::describe_status_text;

use crate::config::Config;
use crate::id_resolver::{resolve_profile_id, resolve_qa_report_id};
use crate::output;

/// QA subcommands
#[derive(Subcommand)]
pub enum QaCommands {
    /// Generate several tracks from one profile and measure their stability
    Generate {
        /// Profile ID or unambiguous prefix
        profile: String,

        /// Number of tracks to compare (2-5)
        #[arg(short, long, default_value_t = 3)]
        batch: usize,
    },
    /// List QA reports
    List {
        /// Only reports for this profile
        #[arg(long)]
        profile: Option<String>,
    },
    /// Get QA report details
    Get {
        /// Report ID or unambiguous prefix
        id: String,
    },
}

/// Handle QA commands
pub async fn handle_qa_command(command: QaCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        QaCommands::Generate { profile, batch } => generate(&client, &profile, batch).await,
        QaCommands::List { profile } => list_reports(&client, profile.as_deref()).await,
        QaCommands::Get { id } => get_report(&client, &id).await,
    }
}

async fn generate(client: &TrackLabClient, profile: &str, batch: usize) -> Result<()> {
    let profile_id = resolve_profile_id(client, profile).await?;
    let started = client
        .generate_qa_batch(profile_id, batch)
        .await
        .context("Failed to start QA batch")?;

    println!("{}", "✓ QA batch started".green().bold());
    println!("  Report: {}", started.report_id.to_string().cyan());
    println!("  Tracks: {}", started.batch_size);
    println!("  Status: {}", output::status(describe_status_text(&started.status)));
    println!(
        "{}",
        format!("  Use `tracklab qa get {}` to read the report", started.report_id).dimmed()
    );

    Ok(())
}

async fn list_reports(client: &TrackLabClient, profile: Option<&str>) -> Result<()> {
    let profile_id = match profile {
        Some(profile) => Some(resolve_profile_id(client, profile).await?),
        None => None,
    };
    let reports = client.list_qa_reports(profile_id).await?;

    if reports.is_empty() {
        println!("{}", "No QA reports found.".yellow());
    } else {
        println!("{}", format!("Found {} report(s):", reports.len()).bold());
        println!();
        for report in reports {
            print_report_summary(&report);
        }
    }

    Ok(())
}

async fn get_report(client: &TrackLabClient, id: &str) -> Result<()> {
    let report_id = resolve_qa_report_id(client, id).await?;
    let report = client.get_qa_report(report_id).await?;

    print_report_details(&report);
    println!("\n{}", "Export:".bold());
    println!("  Report:     {}", client.qa_report_export_url(report_id));
    println!("  All tracks: {}", client.qa_report_full_export_url(report_id));

    Ok(())
}

fn print_report_summary(report: &QaReportSummary) {
    println!("  {} Report {}", "▸".cyan(), report.id.to_string().dimmed());
    println!("    Profile: {}", report.profile_id.to_string().dimmed());
    println!(
        "    Status:  {}",
        output::status(describe_status_text(&report.status))
    );
    println!(
        "    Tracks:  {}/{}",
        report.completed_count, report.batch_size
    );
    if let Some(cdv) = report.mean_cdv {
        println!("    CDV:     {:.3}", cdv);
    }
    println!(
        "    Created: {}",
        report
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_report_details(report: &QaReport) {
    println!("{}", "QA Report:".bold());
    println!("  ID:        {}", report.id.to_string().cyan());
    println!("  Profile:   {}", report.profile_id.to_string().dimmed());
    println!(
        "  Status:    {}",
        output::status(describe_status_text(&report.status))
    );
    println!(
        "  Tracks:    {}/{}",
        report.completed_count, report.batch_size
    );
    if let Some(cdv) = report.mean_cdv {
        let std = report.cdv_std.unwrap_or_default();
        println!("  Mean CDV:  {:.3} ± {:.3}", cdv, std);
    }
    if let Some(recommendation) = &report.recommendation {
        println!("  Verdict:   {}", recommendation.bold());
    }
    if let Some(error) = &report.error_message {
        println!("  Error:     {}", error.red());
    }

    if let Some(data) = &report.report_data {
        print_report_data(data);
    }
}

fn print_report_data(data: &QaReportData) {
    if !data.cdv_matrix.is_empty() {
        println!("\n{}", "Pairwise divergence:".bold());
        println!(
            "  {}",
            format!(
                "{:<12} {:<12} {:>7} {:>7} {:>9} {:>10}",
                "A", "B", "total", "topics", "subtopics", "activities"
            )
            .dimmed()
        );
        for pair in &data.cdv_matrix {
            println!(
                "  {:<12} {:<12} {:>7.3} {:>7.3} {:>9.3} {:>10.3}",
                short(&pair.version_a_id),
                short(&pair.version_b_id),
                pair.cdv_total,
                pair.cdv_topics,
                pair.cdv_subtopics,
                pair.cdv_activities
            );
        }
    }

    if !data.topic_frequency.is_empty() {
        println!("\n{}", "Topic frequency:".bold());
        for topic in &data.topic_frequency {
            println!(
                "  {:>5.1}%  {}/{}  {}",
                topic.frequency_pct, topic.count, topic.total_versions, topic.topic_name
            );
        }
    }

    if !data.top_stable_topics.is_empty() {
        println!("\n{}", "Most stable topics:".bold());
        for topic in &data.top_stable_topics {
            println!("  {} {}", "✓".green(), topic);
        }
    }
    if !data.top_unstable_topics.is_empty() {
        println!("\n{}", "Least stable topics:".bold());
        for topic in &data.top_unstable_topics {
            println!("  {} {}", "!".yellow(), topic);
        }
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
