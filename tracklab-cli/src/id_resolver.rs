//! ID resolver module
//!
//! Handles resolution of UUID prefixes to full UUIDs by querying the API.
//! This allows users to specify short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use tracklab_client::TrackLabClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Pick the single id matching `id_or_prefix`
///
/// # Errors
/// Returns an error if no id or more than one id matches.
pub fn resolve_among(
    kind: &str,
    id_or_prefix: &IdOrPrefix,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids
        .into_iter()
        .filter(|id| id_or_prefix.matches(*id))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No {} found with ID starting with '{}'",
            kind,
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple {}s: {}",
                id_or_prefix,
                kind,
                ids.join(", ")
            ))
        }
    }
}

/// Resolve a profile ID or prefix to a full UUID
pub async fn resolve_profile_id(client: &TrackLabClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let profiles = client
        .list_profiles()
        .await
        .context("Failed to fetch profiles for ID resolution")?;

    resolve_among("profile", &id_or_prefix, profiles.iter().map(|p| p.id))
}

/// Resolve a track ID or prefix to a full UUID
pub async fn resolve_track_id(client: &TrackLabClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let tracks = client
        .list_tracks(None, None)
        .await
        .context("Failed to fetch tracks for ID resolution")?;

    resolve_among("track", &id_or_prefix, tracks.iter().map(|t| t.id))
}

/// Resolve a QA report ID or prefix to a full UUID
pub async fn resolve_qa_report_id(client: &TrackLabClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let reports = client
        .list_qa_reports(None)
        .await
        .context("Failed to fetch QA reports for ID resolution")?;

    resolve_among("QA report", &id_or_prefix, reports.iter().map(|r| r.id))
}

/// Resolve a manual session ID or prefix to a full UUID
pub async fn resolve_session_id(client: &TrackLabClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let sessions = client
        .list_sessions(None)
        .await
        .context("Failed to fetch sessions for ID resolution")?;

    resolve_among(
        "session",
        &id_or_prefix,
        sessions.sessions.iter().map(|s| s.id),
    )
}

/// Resolve a step run ID or prefix within a session
///
/// Only steps that have been run at least once are searched.
pub async fn resolve_run_id(client: &TrackLabClient, session_id: Uuid, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let status = client
        .steps_status(session_id)
        .await
        .context("Failed to fetch session steps for ID resolution")?;

    let mut run_ids = Vec::new();
    for (step_name, step) in &status.steps {
        if step.run_count == 0 {
            continue;
        }
        let Some(step_id) = tracklab_core::domain::step::StepId::parse(step_name) else {
            continue;
        };
        let runs = client
            .step_runs(session_id, step_id)
            .await
            .with_context(|| format!("Failed to fetch runs of {}", step_name))?;
        run_ids.extend(runs.iter().map(|r| r.id));
    }

    resolve_among("run", &id_or_prefix, run_ids)
}
