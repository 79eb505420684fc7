//! Status presentation
//!
//! Every view styles statuses through the descriptors returned here, so a
//! status looks the same wherever it is shown.

use crate::domain::step::{STEP_COUNT, StepStatus};
use crate::domain::track::TrackStatus;
use crate::progress::{BatchPhase, BatchProgress, JobPhase, JobProgress, StepRollup};

/// Visual tone of a status, mapped to a colour by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Muted,
    Active,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDescriptor {
    pub label: &'static str,
    pub glyph: &'static str,
    pub tone: Tone,
}

impl StatusDescriptor {
    const fn new(label: &'static str, glyph: &'static str, tone: Tone) -> Self {
        Self { label, glyph, tone }
    }
}

pub fn describe_step(status: StepStatus) -> StatusDescriptor {
    match status {
        StepStatus::Pending => StatusDescriptor::new("pending", "○", Tone::Muted),
        StepStatus::Running => StatusDescriptor::new("running", "⏳", Tone::Active),
        StepStatus::Completed => StatusDescriptor::new("completed", "✓", Tone::Success),
        StepStatus::Failed => StatusDescriptor::new("failed", "✗", Tone::Danger),
    }
}

pub fn describe_phase(phase: &JobPhase) -> StatusDescriptor {
    match phase {
        JobPhase::Running => StatusDescriptor::new("running", "⏳", Tone::Active),
        JobPhase::Completed { .. } => StatusDescriptor::new("completed", "✓", Tone::Success),
        JobPhase::Cancelled { .. } => StatusDescriptor::new("cancelled", "⊘", Tone::Warning),
        JobPhase::Errored { .. } => StatusDescriptor::new("errored", "✗", Tone::Danger),
    }
}

pub fn describe_batch_phase(phase: &BatchPhase) -> StatusDescriptor {
    match phase {
        BatchPhase::Running => StatusDescriptor::new("running", "⏳", Tone::Active),
        BatchPhase::Settled => StatusDescriptor::new("finished", "✓", Tone::Success),
        BatchPhase::Completed { .. } => StatusDescriptor::new("completed", "✓", Tone::Success),
        BatchPhase::Errored { .. } => StatusDescriptor::new("errored", "✗", Tone::Danger),
    }
}

/// Header of a step position in batch view
pub fn describe_rollup(rollup: StepRollup) -> StatusDescriptor {
    if rollup.all_done {
        StatusDescriptor::new("completed", "✓", Tone::Success)
    } else if rollup.any_running {
        StatusDescriptor::new("running", "⏳", Tone::Active)
    } else if rollup.any_failed {
        StatusDescriptor::new("failed", "✗", Tone::Danger)
    } else {
        StatusDescriptor::new("pending", "○", Tone::Muted)
    }
}

pub fn describe_track_status(status: TrackStatus) -> StatusDescriptor {
    match status {
        TrackStatus::Pending => StatusDescriptor::new("pending", "○", Tone::Muted),
        TrackStatus::Running => StatusDescriptor::new("running", "⏳", Tone::Active),
        TrackStatus::Cancelling => StatusDescriptor::new("cancelling", "⊘", Tone::Warning),
        TrackStatus::Completed => StatusDescriptor::new("completed", "✓", Tone::Success),
        TrackStatus::Cancelled => StatusDescriptor::new("cancelled", "⊘", Tone::Warning),
        TrackStatus::Failed => StatusDescriptor::new("failed", "✗", Tone::Danger),
        TrackStatus::Unknown => StatusDescriptor::new("unknown", "?", Tone::Muted),
    }
}

/// Status string of a `batch_complete` result or a run listing
pub fn describe_status_text(status: &str) -> StatusDescriptor {
    match status {
        "completed" | "success" => StatusDescriptor::new("completed", "✓", Tone::Success),
        "running" => StatusDescriptor::new("running", "⏳", Tone::Active),
        "cancelled" => StatusDescriptor::new("cancelled", "⊘", Tone::Warning),
        "failed" | "error" => StatusDescriptor::new("failed", "✗", Tone::Danger),
        _ => StatusDescriptor::new("pending", "○", Tone::Muted),
    }
}

/// `2.1s` under a minute, `1m 5s` above
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }
    let minutes = (seconds / 60.0).floor();
    format!("{}m {:.0}s", minutes as u64, seconds - minutes * 60.0)
}

/// Text progress bar of `width` cells for a fraction in `[0, 1]`
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// One-line summary of a job, e.g. `3/8 completed, cancelled`
pub fn job_headline(job: &JobProgress) -> String {
    match job.phase() {
        JobPhase::Running => format!(
            "{}/{} completed ({:.0}%)",
            job.completed_count(),
            STEP_COUNT,
            job.progress() * 100.0
        ),
        JobPhase::Completed { .. } => format!("{}/{} completed", job.completed_count(), STEP_COUNT),
        JobPhase::Cancelled {
            completed_steps, ..
        } => format!("{}/{} completed, cancelled", completed_steps.len(), STEP_COUNT),
        JobPhase::Errored { .. } => {
            format!("{}/{} completed, errored", job.completed_count(), STEP_COUNT)
        }
    }
}

/// One-line summary of a batch
pub fn batch_headline(batch: &BatchProgress) -> String {
    match batch.phase() {
        BatchPhase::Completed { .. } => format!("All {} tracks finished", batch.len()),
        BatchPhase::Settled => format!("All {} tracks finished, no batch result", batch.len()),
        _ => format!(
            "{}/{} steps ({:.0}%)",
            batch.completed_count(),
            batch.total_steps(),
            batch.progress() * 100.0
        ),
    }
}
