//! Single job progress view

use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::warn;
use tracklab_client::{ProgressFeed, StreamItem};
use tracklab_core::domain::step::{STEP_COUNT, StepState};
use tracklab_core::presentation::{
    describe_phase, describe_step, format_duration, job_headline, progress_bar,
};
use tracklab_core::progress::{JobPhase, JobProgress, StreamControl};
use uuid::Uuid;

use super::{Canceller, FollowOutcome};
use crate::output;

pub(super) const BAR_WIDTH: usize = 32;

/// Follow one job until it is terminal, the feed ends or the operator detaches
///
/// The first Ctrl-C sends a cancel request; another one while the request
/// is pending stops following.
pub async fn follow_job<F, W>(
    track_id: Uuid,
    feed: &mut F,
    job: &mut JobProgress,
    canceller: &dyn Canceller,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    out: &mut W,
) -> Result<FollowOutcome>
where
    F: ProgressFeed + ?Sized,
    W: Write,
{
    writeln!(out, "{} {}", "Following track".bold(), track_id.to_string().dimmed())?;

    loop {
        tokio::select! {
            biased;

            Some(()) = interrupts.recv() => {
                let now = Instant::now();
                if job.is_cancelling(now) {
                    feed.close();
                    writeln!(out, "{}", "Stopped following. The cancel request stays with the backend.".yellow())?;
                    return Ok(FollowOutcome::Detached);
                }
                if job.request_cancel(now) {
                    canceller.cancel(track_id);
                    writeln!(
                        out,
                        "{}",
                        "Cancel requested, waiting for the pipeline to stop (Ctrl-C again to stop following)".yellow()
                    )?;
                }
            }

            item = feed.next_item() => {
                let Some(item) = item else {
                    writeln!(out, "{}", "Progress stream ended before the job finished".yellow())?;
                    render_job_summary(job, out)?;
                    return Ok(FollowOutcome::FeedEnded);
                };

                if apply_item(job, item, out)?.is_close() {
                    feed.close();
                    render_job_summary(job, out)?;
                    return Ok(FollowOutcome::Finished);
                }
            }
        }
    }
}

fn apply_item<W: Write>(job: &mut JobProgress, item: StreamItem, out: &mut W) -> Result<StreamControl> {
    match item {
        StreamItem::Event(event) => {
            let before = job.steps().clone();
            let control = job.apply(&event);
            if render_changes(&before, job.steps(), None, out)? {
                writeln!(out, "    {}", progress_line(job))?;
            }
            Ok(control)
        }
        StreamItem::TransportError(reason) => {
            warn!(%reason, "Progress stream interrupted");
            let control = job.transport_failure(&reason);
            if !control.is_close() {
                writeln!(
                    out,
                    "{}",
                    format!("  Connection interrupted ({}), reconnecting...", reason).dimmed()
                )?;
            }
            Ok(control)
        }
    }
}

/// Print every step that changed; returns whether anything was printed
pub(super) fn render_changes<W: Write>(
    before: &[StepState; STEP_COUNT],
    after: &[StepState; STEP_COUNT],
    track_label: Option<&str>,
    out: &mut W,
) -> Result<bool> {
    let mut changed = false;
    for (old, new) in before.iter().zip(after.iter()) {
        if old != new {
            changed = true;
            match track_label {
                Some(label) => writeln!(out, "{} {}", label.dimmed(), step_line(new))?,
                None => writeln!(out, "{}", step_line(new))?,
            }
        }
    }
    Ok(changed)
}

/// `  ✓ B2  Competency formulation  completed  3.5s  1200 tokens`
pub(super) fn step_line(step: &StepState) -> String {
    let descriptor = describe_step(step.status);
    let description = step
        .description
        .as_deref()
        .unwrap_or_else(|| step.step.description());

    let mut line = format!(
        "  {} {:<3} {:<42} {}",
        output::glyph(descriptor),
        step.step.short_name().bold(),
        description,
        output::label(descriptor)
    );
    if let Some(duration) = step.duration_seconds {
        line.push_str(&format!("  {}", format_duration(duration).dimmed()));
    }
    if let Some(tokens) = step.tokens_used {
        line.push_str(&format!("  {}", format!("{} tokens", tokens).dimmed()));
    }
    line
}

fn progress_line(job: &JobProgress) -> String {
    format!(
        "[{}] {}",
        progress_bar(job.progress(), BAR_WIDTH),
        job_headline(job)
    )
}

/// Print all steps, the progress bar and how the job ended
pub(super) fn render_job_summary<W: Write>(job: &JobProgress, out: &mut W) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", output::rule())?;
    for step in job.steps() {
        writeln!(out, "{}", step_line(step))?;
    }
    writeln!(out, "{}", output::rule())?;
    writeln!(out, "{}", progress_line(job))?;

    let descriptor = describe_phase(job.phase());
    match job.phase() {
        JobPhase::Running => {}
        JobPhase::Completed {
            total_duration_seconds,
            total_tokens,
            inferred,
        } => {
            let mut line = "Generation completed".to_string();
            if let Some(duration) = total_duration_seconds {
                line.push_str(&format!(" in {}", format_duration(*duration)));
            }
            if let Some(tokens) = total_tokens {
                line.push_str(&format!(", {} tokens", tokens));
            }
            writeln!(out, "{} {}", output::glyph(descriptor), line.green().bold())?;
            if *inferred {
                writeln!(
                    out,
                    "  {}",
                    "(no completion event received; inferred from step states)".dimmed()
                )?;
            }
        }
        JobPhase::Cancelled {
            completed_steps,
            last_step,
        } => {
            let steps: Vec<&str> = completed_steps.iter().map(|s| s.short_name()).collect();
            let line = if steps.is_empty() {
                "Cancelled before any step completed".to_string()
            } else {
                format!("Cancelled after {}", steps.join(", "))
            };
            writeln!(out, "{} {}", output::glyph(descriptor), line.yellow().bold())?;
            if let Some(step) = last_step {
                writeln!(out, "  {}", format!("Stopped during {}", step).dimmed())?;
            }
        }
        JobPhase::Errored {
            message,
            failed_step,
        } => {
            let line = match failed_step {
                Some(step) => format!("Error at {} ({}): {}", step, step.description(), message),
                None => format!("Error: {}", message),
            };
            writeln!(out, "{} {}", output::glyph(descriptor), line.red().bold())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::testing::{RecordingCanceller, ScriptedFeed, output};
    use tracklab_core::domain::step::{StepId, StepStatus};
    use tracklab_core::events::{Cancellation, ProgressEvent, StepUpdate};

    fn update(step: StepId, status: StepStatus) -> StreamItem {
        StreamItem::Event(ProgressEvent::StepUpdate(StepUpdate {
            step: step.short_name().to_string(),
            status,
            description: None,
            duration_sec: (status == StepStatus::Completed).then_some(2.1),
            tokens_used: None,
            summary: None,
            track_id: None,
            batch_index: None,
        }))
    }

    async fn run(
        items: Vec<StreamItem>,
        interrupts: usize,
    ) -> (FollowOutcome, JobProgress, ScriptedFeed, Vec<Uuid>, String) {
        colored::control::set_override(false);

        let track_id = Uuid::new_v4();
        let mut feed = ScriptedFeed::new(items);
        let mut job = JobProgress::new();
        let canceller = RecordingCanceller::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..interrupts {
            tx.send(()).unwrap();
        }
        drop(tx);

        let mut buf = Vec::new();
        let outcome = follow_job(track_id, &mut feed, &mut job, &canceller, &mut rx, &mut buf)
            .await
            .unwrap();
        let cancelled = canceller.cancelled.lock().unwrap().clone();
        (outcome, job, feed, cancelled, output(buf))
    }

    #[tokio::test]
    async fn test_fallback_completion_finishes_view() {
        let mut items = vec![update(StepId::B1, StepStatus::Running)];
        items.extend(StepId::ALL.iter().map(|s| update(*s, StepStatus::Completed)));

        let (outcome, job, feed, cancelled, text) = run(items, 0).await;

        assert_eq!(outcome, FollowOutcome::Finished);
        assert!(matches!(job.phase(), JobPhase::Completed { inferred: true, .. }));
        assert!(feed.closed);
        assert!(cancelled.is_empty());
        assert!(text.contains("0/8 completed (0%)"));
        assert!(text.contains("4/8 completed (50%)"));
        assert!(text.contains("8/8 completed"));
        assert!(text.contains("inferred from step states"));
    }

    #[tokio::test]
    async fn test_cancel_sends_request_and_ignores_late_updates() {
        let items = vec![
            update(StepId::B1, StepStatus::Completed),
            update(StepId::B2, StepStatus::Completed),
            update(StepId::B3, StepStatus::Completed),
            StreamItem::Event(ProgressEvent::Cancelled(Cancellation {
                completed_steps: vec!["B1".into(), "B2".into(), "B3".into()],
                last_step: Some("B4".into()),
                batch_index: None,
            })),
            update(StepId::B4, StepStatus::Completed),
        ];

        let (outcome, job, feed, cancelled, text) = run(items, 1).await;

        assert_eq!(outcome, FollowOutcome::Finished);
        assert_eq!(cancelled.len(), 1);
        assert!(text.contains("Cancel requested"));
        assert!(text.contains("3/8 completed, cancelled"));
        assert!(text.contains("Stopped during B4"));
        assert_eq!(job.step(StepId::B4).status, StepStatus::Pending);
        // the late update was never read
        assert_eq!(feed.items.len(), 1);
    }

    #[tokio::test]
    async fn test_second_interrupt_detaches() {
        let items = vec![update(StepId::B1, StepStatus::Running)];
        let (outcome, job, feed, cancelled, text) = run(items, 2).await;

        assert_eq!(outcome, FollowOutcome::Detached);
        assert_eq!(cancelled.len(), 1);
        assert!(feed.closed);
        assert_eq!(job.phase(), &JobPhase::Running);
        assert!(text.contains("Stopped following"));
    }

    #[tokio::test]
    async fn test_transport_failures_are_bounded() {
        let items = vec![
            update(StepId::B1, StepStatus::Running),
            StreamItem::TransportError("connection reset".into()),
            StreamItem::TransportError("connection reset".into()),
            StreamItem::TransportError("connection refused".into()),
            update(StepId::B1, StepStatus::Completed),
        ];

        let (outcome, job, _, _, text) = run(items, 0).await;

        assert_eq!(outcome, FollowOutcome::Finished);
        assert_eq!(
            job.phase(),
            &JobPhase::Errored {
                message: "Connection lost: connection refused".to_string(),
                failed_step: None,
            }
        );
        assert!(text.contains("reconnecting"));
        assert!(text.contains("Error: Connection lost: connection refused"));
    }

    #[tokio::test]
    async fn test_feed_end_is_reported() {
        let (outcome, _, _, _, text) = run(vec![update(StepId::B1, StepStatus::Running)], 0).await;
        assert_eq!(outcome, FollowOutcome::FeedEnded);
        assert!(text.contains("ended before the job finished"));
    }

    #[test]
    fn test_step_line_shows_metrics() {
        colored::control::set_override(false);
        let mut step = StepState::pending(StepId::B2);
        step.status = StepStatus::Completed;
        step.duration_seconds = Some(65.0);
        step.tokens_used = Some(1200);

        let line = step_line(&step);
        assert!(line.contains("B2"));
        assert!(line.contains("Competency formulation"));
        assert!(line.contains("completed"));
        assert!(line.contains("1m 5s"));
        assert!(line.contains("1200 tokens"));
    }
}
