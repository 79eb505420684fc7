//! Batch progress view

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Result;
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::warn;
use tracklab_client::{ProgressFeed, StreamItem};
use tracklab_core::domain::step::{STEP_COUNT, StepId};
use tracklab_core::presentation::{
    batch_headline, describe_batch_phase, describe_phase, describe_rollup, format_duration,
    job_headline, progress_bar,
};
use tracklab_core::progress::comparison::MISSING_VALUE;
use tracklab_core::progress::{BatchPhase, BatchProgress, ComparisonTable, JobPhase, StreamControl};
use uuid::Uuid;

use super::job::{BAR_WIDTH, render_changes};
use super::{Canceller, FollowOutcome};
use crate::output;

const VALUE_WIDTH: usize = 12;

/// Follow every job of a batch over the shared feed
///
/// Each step's comparison table is printed once, as soon as every track
/// has completed that step.
pub async fn follow_batch<F, W>(
    batch: &mut BatchProgress,
    feed: &mut F,
    canceller: &dyn Canceller,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    out: &mut W,
) -> Result<FollowOutcome>
where
    F: ProgressFeed + ?Sized,
    W: Write,
{
    writeln!(
        out,
        "{} {} ({} tracks)",
        "Following batch".bold(),
        batch.batch_id().to_string().dimmed(),
        batch.len()
    )?;

    let mut revealed = [false; STEP_COUNT];

    loop {
        let grace = batch.is_settled().then(|| batch.settle_grace());

        tokio::select! {
            biased;

            Some(()) = interrupts.recv() => {
                let now = Instant::now();
                if batch.is_cancelling(now) {
                    feed.close();
                    writeln!(out, "{}", "Stopped following. Cancel requests stay with the backend.".yellow())?;
                    return Ok(FollowOutcome::Detached);
                }
                let indices = batch.request_cancel(now);
                for &index in &indices {
                    match batch.track_ids().get(index) {
                        Some(&track_id) if !track_id.is_nil() => canceller.cancel(track_id),
                        _ => warn!(batch_index = index, "Track id unknown, cannot send cancel request"),
                    }
                }
                if !indices.is_empty() {
                    writeln!(
                        out,
                        "{}",
                        format!(
                            "Cancel requested for {} track(s) (Ctrl-C again to stop following)",
                            indices.len()
                        )
                        .yellow()
                    )?;
                }
            }

            item = next_or_grace(feed, grace) => {
                let Some(item) = item else {
                    feed.close();
                    render_batch_summary(batch, out)?;
                    return Ok(FollowOutcome::Finished);
                };
                let Some(item) = item else {
                    if batch.is_settled() {
                        render_batch_summary(batch, out)?;
                        return Ok(FollowOutcome::Finished);
                    }
                    writeln!(out, "{}", "Progress stream ended before the batch finished".yellow())?;
                    render_batch_summary(batch, out)?;
                    return Ok(FollowOutcome::FeedEnded);
                };

                let was_settled = batch.is_settled();
                let control = apply_item(batch, item, out)?;
                reveal_comparisons(batch, &mut revealed, out)?;
                if !was_settled && batch.is_settled() {
                    writeln!(out, "{}", "  All tracks finished, waiting for the batch result...".dimmed())?;
                }
                if control.is_close() {
                    feed.close();
                    render_batch_summary(batch, out)?;
                    return Ok(FollowOutcome::Finished);
                }
            }
        }
    }
}

/// Next feed item, or `None` once a settled batch waited out its grace
async fn next_or_grace<F: ProgressFeed + ?Sized>(
    feed: &mut F,
    grace: Option<Duration>,
) -> Option<Option<StreamItem>> {
    match grace {
        Some(grace) => tokio::time::timeout(grace, feed.next_item()).await.ok(),
        None => Some(feed.next_item().await),
    }
}

fn apply_item<W: Write>(batch: &mut BatchProgress, item: StreamItem, out: &mut W) -> Result<StreamControl> {
    let event = match item {
        StreamItem::Event(event) => event,
        StreamItem::TransportError(reason) => {
            warn!(batch_id = %batch.batch_id(), %reason, "Batch stream interrupted");
            let control = batch.transport_failure(&reason);
            if !control.is_close() {
                writeln!(
                    out,
                    "{}",
                    format!("  Connection interrupted ({}), reconnecting...", reason).dimmed()
                )?;
            }
            return Ok(control);
        }
    };

    let steps_before: Vec<_> = batch.jobs().iter().map(|job| job.steps().clone()).collect();
    let phases_before: Vec<JobPhase> = batch.jobs().iter().map(|job| job.phase().clone()).collect();
    let rollups_before = StepId::ALL.map(|step| batch.rollup(step));

    let control = batch.apply(&event);

    let mut changed = false;
    for (index, job) in batch.jobs().iter().enumerate() {
        let label = track_label(batch, index);
        changed |= render_changes(&steps_before[index], job.steps(), Some(&label), out)?;
        if job.phase() != &phases_before[index] && job.is_terminal() {
            changed = true;
            writeln!(
                out,
                "{} {} {}",
                label.dimmed(),
                output::status(describe_phase(job.phase())),
                job_headline(job).dimmed()
            )?;
        }
    }

    for (step, before) in StepId::ALL.into_iter().zip(rollups_before) {
        let rollup = batch.rollup(step);
        if rollup != before {
            writeln!(
                out,
                "  {} {:<3} {}",
                "all tracks".dimmed(),
                step.short_name().bold(),
                output::status(describe_rollup(rollup))
            )?;
        }
    }

    if changed {
        writeln!(out, "    {}", progress_line(batch))?;
    }
    Ok(control)
}

fn reveal_comparisons<W: Write>(
    batch: &BatchProgress,
    revealed: &mut [bool; STEP_COUNT],
    out: &mut W,
) -> Result<()> {
    for step in StepId::ALL {
        if revealed[step.index()] {
            continue;
        }
        if let Some(table) = batch.comparison(step) {
            revealed[step.index()] = true;
            render_comparison(&table, out)?;
        }
    }
    Ok(())
}

/// Print one step's results side by side, differing rows highlighted
pub(crate) fn render_comparison<W: Write>(table: &ComparisonTable, out: &mut W) -> Result<()> {
    let tracks = table.durations.len();
    let label_width = table
        .rows
        .iter()
        .map(|row| row.label().chars().count())
        .chain(std::iter::once("duration".len()))
        .max()
        .unwrap_or_default();

    writeln!(out)?;
    writeln!(
        out,
        "  {} {} across {} tracks",
        table.step.short_name().bold(),
        table.step.description(),
        tracks
    )?;

    let mut header = format!("  {:<label_width$}", "");
    for index in 0..tracks {
        header.push_str(&format!(" {:>VALUE_WIDTH$}", format!("#{}", index + 1)));
    }
    writeln!(out, "{}", header.dimmed())?;

    for row in &table.rows {
        let mut line = format!("  {:<label_width$}", row.label());
        for value in &row.values {
            line.push_str(&format!(" {:>VALUE_WIDTH$}", value));
        }
        if row.differs {
            writeln!(out, "{}", line.yellow())?;
        } else {
            writeln!(out, "{}", line)?;
        }
    }

    let mut durations = format!("  {:<label_width$}", "duration");
    for duration in &table.durations {
        let value = duration.map_or_else(|| MISSING_VALUE.to_string(), format_duration);
        durations.push_str(&format!(" {:>VALUE_WIDTH$}", value));
    }
    writeln!(out, "{}", durations.dimmed())?;
    writeln!(out)?;
    Ok(())
}

/// Print the outcome of every track and of the batch
fn render_batch_summary<W: Write>(batch: &BatchProgress, out: &mut W) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", output::rule())?;
    for (index, job) in batch.jobs().iter().enumerate() {
        let mut line = format!(
            "{}  {}  {}",
            track_label(batch, index),
            output::status(describe_phase(job.phase())),
            job_headline(job)
        );
        if let Some(duration) = batch.result(index).and_then(|r| r.duration_sec) {
            line.push_str(&format!("  {}", format_duration(duration).dimmed()));
        }
        writeln!(out, "{}", line)?;
        if let JobPhase::Errored { message, failed_step } = job.phase() {
            let at = failed_step.map(|s| format!(" at {}", s)).unwrap_or_default();
            writeln!(out, "    {}", format!("Error{}: {}", at, message).red())?;
        }
    }
    writeln!(out, "{}", output::rule())?;
    writeln!(
        out,
        "{} {}",
        output::status(describe_batch_phase(batch.phase())),
        progress_line(batch)
    )?;
    if let BatchPhase::Errored { message } = batch.phase() {
        writeln!(out, "{}", format!("Batch failed: {}", message).red().bold())?;
    }
    Ok(())
}

fn progress_line(batch: &BatchProgress) -> String {
    format!(
        "[{}] {}",
        progress_bar(batch.progress(), BAR_WIDTH),
        batch_headline(batch)
    )
}

/// `#2 1f0c9a3e`
fn track_label(batch: &BatchProgress, index: usize) -> String {
    let short = batch
        .track_ids()
        .get(index)
        .map(|id| short_id(*id))
        .unwrap_or_default();
    format!("#{} {}", index + 1, short)
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::testing::{RecordingCanceller, ScriptedFeed, output};
    use serde_json::json;
    use tracklab_core::domain::step::StepStatus;
    use tracklab_core::events::{BatchCompletion, BatchResult, Failure, ProgressEvent, StepUpdate};
    use tracklab_core::progress::ProgressLimits;

    fn update(index: i64, step: StepId, status: StepStatus, summary: serde_json::Value) -> StreamItem {
        StreamItem::Event(ProgressEvent::StepUpdate(StepUpdate {
            step: step.short_name().to_string(),
            status,
            description: None,
            duration_sec: (status == StepStatus::Completed).then_some(3.0),
            tokens_used: None,
            summary: summary.as_object().cloned(),
            track_id: None,
            batch_index: Some(index),
        }))
    }

    fn result(index: i64, status: &str, error: Option<&str>) -> BatchResult {
        BatchResult {
            track_id: None,
            batch_index: index,
            status: status.to_string(),
            duration_sec: Some(42.0),
            error: error.map(str::to_string),
        }
    }

    async fn run(
        items: Vec<StreamItem>,
        interrupts: usize,
    ) -> (FollowOutcome, BatchProgress, Vec<Uuid>, String) {
        colored::control::set_override(false);

        let mut batch = BatchProgress::new(Uuid::new_v4(), vec![Uuid::new_v4(), Uuid::new_v4()]);
        let mut feed = ScriptedFeed::new(items);
        let canceller = RecordingCanceller::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..interrupts {
            tx.send(()).unwrap();
        }
        drop(tx);

        let mut buf = Vec::new();
        let outcome = follow_batch(&mut batch, &mut feed, &canceller, &mut rx, &mut buf)
            .await
            .unwrap();
        let cancelled = canceller.cancelled.lock().unwrap().clone();
        (outcome, batch, cancelled, output(buf))
    }

    #[tokio::test]
    async fn test_comparison_revealed_once_and_results_applied() {
        let items = vec![
            update(0, StepId::B1, StepStatus::Running, json!(null)),
            update(
                0,
                StepId::B1,
                StepStatus::Completed,
                json!({"effective_level": "middle", "estimated_weeks": 12}),
            ),
            update(
                1,
                StepId::B1,
                StepStatus::Completed,
                json!({"effective_level": "middle", "estimated_weeks": 14}),
            ),
            update(0, StepId::B2, StepStatus::Running, json!(null)),
            StreamItem::Event(ProgressEvent::BatchComplete(BatchCompletion {
                results: vec![
                    result(0, "completed", None),
                    result(1, "failed", Some("LLM timeout")),
                ],
            })),
        ];

        let (outcome, batch, cancelled, text) = run(items, 0).await;

        assert_eq!(outcome, FollowOutcome::Finished);
        assert!(cancelled.is_empty());
        assert_eq!(text.matches("across 2 tracks").count(), 1);
        assert!(text.contains("estimated weeks"));
        assert!(text.contains("14"));
        assert!(matches!(batch.job(0).unwrap().phase(), JobPhase::Completed { .. }));
        assert!(matches!(batch.job(1).unwrap().phase(), JobPhase::Errored { .. }));
        assert!(text.contains("Error: LLM timeout"));
        assert!(text.contains("All 2 tracks finished"));
    }

    #[tokio::test]
    async fn test_interrupt_cancels_every_running_track() {
        let items = vec![
            update(0, StepId::B1, StepStatus::Running, json!(null)),
            StreamItem::Event(ProgressEvent::BatchComplete(BatchCompletion {
                results: vec![result(0, "cancelled", None), result(1, "cancelled", None)],
            })),
        ];

        let (outcome, batch, cancelled, text) = run(items, 1).await;

        assert_eq!(outcome, FollowOutcome::Finished);
        assert_eq!(cancelled, batch.track_ids().to_vec());
        assert!(text.contains("Cancel requested for 2 track(s)"));
        assert!(
            batch
                .jobs()
                .iter()
                .all(|job| matches!(job.phase(), JobPhase::Cancelled { .. }))
        );
    }

    #[tokio::test]
    async fn test_batch_wide_error_stops_following() {
        let items = vec![
            update(1, StepId::B1, StepStatus::Running, json!(null)),
            StreamItem::Event(ProgressEvent::Error(Failure {
                error: "Profile not found".to_string(),
                failed_step: None,
                batch_index: None,
            })),
            update(1, StepId::B1, StepStatus::Completed, json!(null)),
        ];

        let (outcome, batch, _, text) = run(items, 0).await;

        assert_eq!(outcome, FollowOutcome::Finished);
        assert!(matches!(batch.phase(), BatchPhase::Errored { .. }));
        assert_eq!(batch.job(1).unwrap().step(StepId::B1).status, StepStatus::Running);
        assert!(text.contains("Batch failed: Profile not found"));
    }

    fn all_steps_completed(index: i64) -> Vec<StreamItem> {
        StepId::ALL
            .into_iter()
            .map(|step| update(index, step, StepStatus::Completed, json!(null)))
            .collect()
    }

    #[tokio::test]
    async fn test_settled_batch_finishes_when_server_closes() {
        let mut items = all_steps_completed(0);
        items.extend(all_steps_completed(1));
        items.push(StreamItem::TransportError("connection closed by server".to_string()));

        let (outcome, batch, _, text) = run(items, 0).await;

        assert_eq!(outcome, FollowOutcome::Finished);
        assert_eq!(batch.phase(), &BatchPhase::Settled);
        assert!(text.contains("waiting for the batch result"));
        assert!(text.contains("All 2 tracks finished, no batch result"));
        assert!(!text.contains("Batch failed"));
        assert!(!text.contains("Connection interrupted"));
    }

    #[tokio::test]
    async fn test_settled_batch_stops_waiting_after_grace() {
        colored::control::set_override(false);
        let mut items = all_steps_completed(0);
        items.extend(all_steps_completed(1));

        let limits = ProgressLimits {
            settle_grace: Duration::from_millis(20),
            ..Default::default()
        };
        let mut batch =
            BatchProgress::with_limits(Uuid::new_v4(), vec![Uuid::new_v4(), Uuid::new_v4()], limits);
        let mut feed = ScriptedFeed::hanging(items);
        let canceller = RecordingCanceller::default();
        let (_tx, mut rx) = mpsc::unbounded_channel();

        let mut buf = Vec::new();
        let outcome = follow_batch(&mut batch, &mut feed, &canceller, &mut rx, &mut buf)
            .await
            .unwrap();

        assert_eq!(outcome, FollowOutcome::Finished);
        assert!(feed.closed);
        assert!(batch.is_settled());
        assert!(output(buf).contains("no batch result"));
    }

    #[test]
    fn test_comparison_marks_missing_values() {
        colored::control::set_override(false);
        let table = ComparisonTable {
            step: StepId::B2,
            rows: vec![tracklab_core::progress::ComparisonRow {
                key: "competencies_count",
                values: vec!["5".to_string(), MISSING_VALUE.to_string()],
                differs: true,
            }],
            durations: vec![Some(2.0), None],
        };

        let mut buf = Vec::new();
        render_comparison(&table, &mut buf).unwrap();
        let text = output(buf);

        assert!(text.contains("competencies count"));
        assert!(text.contains("#2"));
        assert!(text.contains("2.0s"));
        assert_eq!(text.matches(MISSING_VALUE).count(), 2);
    }
}
