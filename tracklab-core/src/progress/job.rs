//! Single-job progress reducer
//!
//! Folds an at-least-once, possibly reordered stream of progress events into
//! the per-step state of one generation job and decides when the job is
//! over. Updates are last-write-wins per step; the job phase is terminal
//! once it leaves `Running`.

use std::time::Instant;

use crate::domain::step::{STEP_COUNT, StepId, StepState, StepStatus, pending_steps};
use crate::events::{Cancellation, Completion, Failure, ProgressEvent, StepUpdate};

use super::{ProgressLimits, StreamControl};

/// Lifecycle phase of a job as seen by the console
#[derive(Debug, Clone, PartialEq)]
pub enum JobPhase {
    Running,
    Completed {
        total_duration_seconds: Option<f64>,
        total_tokens: Option<u64>,
        /// Set when completion was inferred from step states because the
        /// `complete` event never arrived
        inferred: bool,
    },
    Cancelled {
        /// Steps that had completed when the job stopped
        completed_steps: Vec<StepId>,
        last_step: Option<StepId>,
    },
    Errored {
        message: String,
        failed_step: Option<StepId>,
    },
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobPhase::Running)
    }
}

/// Progress state of one generation job
#[derive(Debug, Clone)]
pub struct JobProgress {
    steps: [StepState; STEP_COUNT],
    phase: JobPhase,
    current_step: Option<StepId>,
    cancel_requested_at: Option<Instant>,
    transport_failures: u32,
    last_transport_error: Option<String>,
    limits: ProgressLimits,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProgress {
    /// Fresh job with every step pending
    pub fn new() -> Self {
        Self::with_limits(ProgressLimits::default())
    }

    pub fn with_limits(limits: ProgressLimits) -> Self {
        Self {
            steps: pending_steps(),
            phase: JobPhase::Running,
            current_step: None,
            cancel_requested_at: None,
            transport_failures: 0,
            last_transport_error: None,
            limits,
        }
    }

    pub fn steps(&self) -> &[StepState; STEP_COUNT] {
        &self.steps
    }

    pub fn step(&self, step: StepId) -> &StepState {
        &self.steps[step.index()]
    }

    pub fn phase(&self) -> &JobPhase {
        &self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Step that received the most recent update
    pub fn current_step(&self) -> Option<StepId> {
        self.current_step
    }

    /// Number of steps currently observed as completed
    pub fn completed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_completed()).count()
    }

    /// Fraction of the catalog completed, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.completed_count() as f64 / STEP_COUNT as f64
    }

    pub fn completed_steps(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| s.is_completed())
            .map(|s| s.step)
            .collect()
    }

    pub fn consecutive_transport_failures(&self) -> u32 {
        self.transport_failures
    }

    /// Apply one decoded event
    ///
    /// Events arriving after the job reached a terminal phase change
    /// nothing and ask the caller to close the stream again.
    pub fn apply(&mut self, event: &ProgressEvent) -> StreamControl {
        if self.is_terminal() {
            return StreamControl::Close;
        }
        self.transport_failures = 0;
        self.last_transport_error = None;

        match event {
            ProgressEvent::StepUpdate(update) => self.apply_step_update(update),
            ProgressEvent::Complete(done) => self.complete(done),
            ProgressEvent::Cancelled(cancelled) => self.cancel(cancelled),
            ProgressEvent::Error(failure) => self.fail(failure),
            ProgressEvent::BatchComplete(_) => StreamControl::Continue,
        }
    }

    /// Record a transport-level failure (disconnect, read error)
    ///
    /// The stream is given up only after `max_transport_failures` failures
    /// in a row; the job is then marked errored locally.
    pub fn transport_failure(&mut self, reason: &str) -> StreamControl {
        if self.is_terminal() {
            return StreamControl::Close;
        }
        self.transport_failures += 1;
        self.last_transport_error = Some(reason.to_string());

        if self.transport_failures >= self.limits.max_transport_failures {
            self.phase = JobPhase::Errored {
                message: format!("Connection lost: {}", reason),
                failed_step: None,
            };
            return StreamControl::Close;
        }
        StreamControl::Continue
    }

    pub fn last_transport_error(&self) -> Option<&str> {
        self.last_transport_error.as_deref()
    }

    /// Register a local cancel request
    ///
    /// Returns `true` when the caller should send the cancel command. Only
    /// running jobs accept it, and only if no earlier request is still
    /// inside the cancel window.
    pub fn request_cancel(&mut self, now: Instant) -> bool {
        if self.is_terminal() || self.is_cancelling(now) {
            return false;
        }
        self.cancel_requested_at = Some(now);
        true
    }

    /// Whether a cancel request is pending and still blocks new ones
    pub fn is_cancelling(&self, now: Instant) -> bool {
        match self.cancel_requested_at {
            Some(at) if !self.is_terminal() => {
                now.saturating_duration_since(at) < self.limits.cancel_window
            }
            _ => false,
        }
    }

    /// Whether a cancel was ever requested while the job is still running
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested_at.is_some() && !self.is_terminal()
    }

    /// Force a phase, bypassing the terminal guard
    ///
    /// Only authoritative sources (a `batch_complete` result) may do this.
    pub(crate) fn settle(&mut self, phase: JobPhase) {
        self.phase = phase;
    }

    fn apply_step_update(&mut self, update: &StepUpdate) -> StreamControl {
        let Some(step) = StepId::parse(&update.step) else {
            return StreamControl::Continue;
        };

        let slot = &mut self.steps[step.index()];
        slot.status = update.status;
        if let Some(description) = &update.description {
            slot.description = Some(description.clone());
        }
        if let Some(duration) = update.duration_sec {
            slot.duration_seconds = Some(duration);
        }
        if let Some(tokens) = update.tokens_used {
            slot.tokens_used = Some(tokens);
        }
        if let Some(summary) = &update.summary {
            slot.summary = summary.clone();
        }
        self.current_step = Some(step);

        self.check_fallback_completion()
    }

    /// Infer completion when every step completed but `complete` was lost
    fn check_fallback_completion(&mut self) -> StreamControl {
        if !self.is_terminal() && self.completed_count() == STEP_COUNT {
            self.phase = JobPhase::Completed {
                total_duration_seconds: None,
                total_tokens: None,
                inferred: true,
            };
            return StreamControl::Close;
        }
        StreamControl::Continue
    }

    fn complete(&mut self, done: &Completion) -> StreamControl {
        self.phase = JobPhase::Completed {
            total_duration_seconds: done.total_duration_sec,
            total_tokens: done.total_tokens,
            inferred: false,
        };
        StreamControl::Close
    }

    fn cancel(&mut self, cancelled: &Cancellation) -> StreamControl {
        let mut completed_steps: Vec<StepId> = cancelled
            .completed_steps
            .iter()
            .filter_map(|s| StepId::parse(s))
            .collect();
        if completed_steps.is_empty() {
            completed_steps = self.completed_steps();
        }
        completed_steps.sort();
        completed_steps.dedup();

        self.phase = JobPhase::Cancelled {
            completed_steps,
            last_step: cancelled.last_step.as_deref().and_then(StepId::parse),
        };
        StreamControl::Close
    }

    fn fail(&mut self, failure: &Failure) -> StreamControl {
        let failed_step = failure.failed_step.as_deref().and_then(StepId::parse);
        if let Some(step) = failed_step {
            self.steps[step.index()].status = StepStatus::Failed;
        }
        self.phase = JobPhase::Errored {
            message: failure.error.clone(),
            failed_step,
        };
        StreamControl::Close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn update(step: &str, status: StepStatus) -> ProgressEvent {
        ProgressEvent::StepUpdate(StepUpdate {
            step: step.to_string(),
            status,
            description: None,
            duration_sec: None,
            tokens_used: None,
            summary: None,
            track_id: None,
            batch_index: None,
        })
    }

    fn completed(step: StepId, duration: f64) -> ProgressEvent {
        ProgressEvent::StepUpdate(StepUpdate {
            duration_sec: Some(duration),
            ..match update(step.short_name(), StepStatus::Completed) {
                ProgressEvent::StepUpdate(u) => u,
                _ => unreachable!(),
            }
        })
    }

    #[test]
    fn test_new_job_is_running_with_pending_steps() {
        let job = JobProgress::new();
        assert_eq!(job.phase(), &JobPhase::Running);
        assert_eq!(job.progress(), 0.0);
        assert!(job.steps().iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn test_step_progression_and_fallback_completion() {
        let mut job = JobProgress::new();

        assert_eq!(job.apply(&update("B1", StepStatus::Running)), StreamControl::Continue);
        assert_eq!(job.progress(), 0.0);
        assert_eq!(job.step(StepId::B1).status, StepStatus::Running);

        job.apply(&completed(StepId::B1, 2.1));
        assert_eq!(job.progress(), 0.125);
        assert_eq!(job.step(StepId::B1).duration_seconds, Some(2.1));

        for step in &StepId::ALL[1..7] {
            assert_eq!(job.apply(&completed(*step, 1.0)), StreamControl::Continue);
        }
        assert_eq!(job.phase(), &JobPhase::Running);

        assert_eq!(job.apply(&completed(StepId::B8, 1.0)), StreamControl::Close);
        assert_eq!(
            job.phase(),
            &JobPhase::Completed {
                total_duration_seconds: None,
                total_tokens: None,
                inferred: true,
            }
        );
    }

    #[test]
    fn test_partial_update_keeps_previous_fields() {
        let mut job = JobProgress::new();
        job.apply(&ProgressEvent::StepUpdate(StepUpdate {
            step: "B2".to_string(),
            status: StepStatus::Completed,
            description: Some("Competencies".to_string()),
            duration_sec: Some(4.0),
            tokens_used: Some(900),
            summary: json!({"competencies_count": 5}).as_object().cloned(),
            track_id: None,
            batch_index: None,
        }));
        // duplicate delivery without metrics
        job.apply(&update("B2", StepStatus::Completed));

        let step = job.step(StepId::B2);
        assert_eq!(step.duration_seconds, Some(4.0));
        assert_eq!(step.tokens_used, Some(900));
        assert_eq!(step.description.as_deref(), Some("Competencies"));
        assert_eq!(step.summary["competencies_count"], 5);
        assert_eq!(job.completed_count(), 1);
    }

    #[test]
    fn test_status_may_regress_by_arrival_order() {
        let mut job = JobProgress::new();
        job.apply(&update("B3", StepStatus::Completed));
        job.apply(&update("B3", StepStatus::Running));
        assert_eq!(job.step(StepId::B3).status, StepStatus::Running);
        assert_eq!(job.completed_count(), 0);
    }

    #[test]
    fn test_unknown_step_is_ignored() {
        let mut job = JobProgress::new();
        assert_eq!(job.apply(&update("B9", StepStatus::Completed)), StreamControl::Continue);
        assert_eq!(job.completed_count(), 0);
        assert_eq!(job.current_step(), None);
    }

    #[test]
    fn test_long_step_names_resolve() {
        let mut job = JobProgress::new();
        job.apply(&update("B5_hierarchy", StepStatus::Running));
        assert_eq!(job.step(StepId::B5).status, StepStatus::Running);
        assert_eq!(job.current_step(), Some(StepId::B5));
    }

    #[test]
    fn test_complete_event_records_totals() {
        let mut job = JobProgress::new();
        let control = job.apply(&ProgressEvent::Complete(Completion {
            total_duration_sec: Some(61.0),
            total_tokens: Some(12000),
            batch_index: None,
        }));
        assert_eq!(control, StreamControl::Close);
        assert_eq!(
            job.phase(),
            &JobPhase::Completed {
                total_duration_seconds: Some(61.0),
                total_tokens: Some(12000),
                inferred: false,
            }
        );
    }

    #[test]
    fn test_cancel_scenario_ignores_late_updates() {
        let mut job = JobProgress::new();
        for step in [StepId::B1, StepId::B2, StepId::B3] {
            job.apply(&completed(step, 1.0));
        }

        let now = Instant::now();
        assert!(job.request_cancel(now));
        assert!(job.is_cancelling(now));
        assert_eq!(job.phase(), &JobPhase::Running);

        let control = job.apply(&ProgressEvent::Cancelled(Cancellation {
            completed_steps: vec!["B1".into(), "B2".into(), "B3".into()],
            last_step: Some("B4".into()),
            batch_index: None,
        }));
        assert_eq!(control, StreamControl::Close);
        assert_eq!(
            job.phase(),
            &JobPhase::Cancelled {
                completed_steps: vec![StepId::B1, StepId::B2, StepId::B3],
                last_step: Some(StepId::B4),
            }
        );

        assert_eq!(job.apply(&completed(StepId::B4, 1.0)), StreamControl::Close);
        assert_eq!(job.step(StepId::B4).status, StepStatus::Pending);
        assert_eq!(job.completed_count(), 3);
        assert!(!job.is_cancelling(now));
    }

    #[test]
    fn test_cancelled_without_list_snapshots_completed_steps() {
        let mut job = JobProgress::new();
        job.apply(&completed(StepId::B1, 1.0));
        job.apply(&completed(StepId::B2, 1.0));
        job.apply(&ProgressEvent::Cancelled(Cancellation::default()));

        let JobPhase::Cancelled { completed_steps, .. } = job.phase() else {
            panic!("expected cancelled");
        };
        assert_eq!(completed_steps, &vec![StepId::B1, StepId::B2]);
    }

    #[test]
    fn test_first_terminal_event_wins() {
        let mut job = JobProgress::new();
        job.apply(&ProgressEvent::Complete(Completion::default()));
        let before = job.phase().clone();

        assert_eq!(
            job.apply(&ProgressEvent::Cancelled(Cancellation::default())),
            StreamControl::Close
        );
        assert_eq!(job.phase(), &before);
    }

    #[test]
    fn test_error_event_marks_failed_step() {
        let mut job = JobProgress::new();
        job.apply(&update("B6", StepStatus::Running));
        job.apply(&ProgressEvent::Error(Failure {
            error: "LLM returned invalid JSON".to_string(),
            failed_step: Some("B6_problem_formulations".to_string()),
            batch_index: None,
        }));

        assert_eq!(
            job.phase(),
            &JobPhase::Errored {
                message: "LLM returned invalid JSON".to_string(),
                failed_step: Some(StepId::B6),
            }
        );
        assert_eq!(job.step(StepId::B6).status, StepStatus::Failed);
    }

    #[test]
    fn test_single_transport_blip_does_not_abort() {
        let mut job = JobProgress::new();
        assert_eq!(job.transport_failure("reset by peer"), StreamControl::Continue);
        job.apply(&update("B1", StepStatus::Running));
        assert_eq!(job.consecutive_transport_failures(), 0);
        assert_eq!(job.transport_failure("reset by peer"), StreamControl::Continue);
        assert_eq!(job.transport_failure("reset by peer"), StreamControl::Continue);
        assert_eq!(job.phase(), &JobPhase::Running);
    }

    #[test]
    fn test_bounded_transport_failures_error_the_job() {
        let mut job = JobProgress::with_limits(ProgressLimits {
            max_transport_failures: 2,
            ..Default::default()
        });
        assert_eq!(job.transport_failure("timeout"), StreamControl::Continue);
        assert_eq!(job.transport_failure("timeout"), StreamControl::Close);
        assert_eq!(
            job.phase(),
            &JobPhase::Errored {
                message: "Connection lost: timeout".to_string(),
                failed_step: None,
            }
        );
    }

    #[test]
    fn test_cancel_window_blocks_repeated_requests() {
        let mut job = JobProgress::with_limits(ProgressLimits {
            cancel_window: Duration::from_secs(5),
            ..Default::default()
        });
        let start = Instant::now();
        assert!(job.request_cancel(start));
        assert!(!job.request_cancel(start + Duration::from_secs(1)));
        assert!(job.cancel_requested());
        assert!(!job.is_cancelling(start + Duration::from_secs(6)));
        assert!(job.request_cancel(start + Duration::from_secs(6)));
    }

    #[test]
    fn test_terminal_job_refuses_cancel() {
        let mut job = JobProgress::new();
        job.apply(&ProgressEvent::Complete(Completion::default()));
        assert!(!job.request_cancel(Instant::now()));
        assert!(!job.cancel_requested());
    }

    fn arb_status() -> impl Strategy<Value = StepStatus> {
        prop_oneof![
            Just(StepStatus::Pending),
            Just(StepStatus::Running),
            Just(StepStatus::Completed),
            Just(StepStatus::Failed),
        ]
    }

    fn arb_update() -> impl Strategy<Value = (usize, StepStatus)> {
        (0..STEP_COUNT, arb_status())
    }

    proptest! {
        #[test]
        fn progress_matches_completed_count(updates in proptest::collection::vec(arb_update(), 0..40)) {
            let mut job = JobProgress::new();
            let mut last = [StepStatus::Pending; STEP_COUNT];

            for (index, status) in updates {
                let terminal_before = job.is_terminal();
                job.apply(&update(StepId::ALL[index].short_name(), status));
                if !terminal_before {
                    last[index] = status;
                }
            }

            let expected = last.iter().filter(|s| **s == StepStatus::Completed).count();
            prop_assert_eq!(job.completed_count(), expected);
            prop_assert_eq!(job.progress(), expected as f64 / STEP_COUNT as f64);
        }

        #[test]
        fn completion_is_order_independent(order in Just((0..STEP_COUNT).collect::<Vec<_>>()).prop_shuffle()) {
            let mut job = JobProgress::new();
            for (i, index) in order.iter().enumerate() {
                let control = job.apply(&update(StepId::ALL[*index].short_name(), StepStatus::Completed));
                let expect_close = i == STEP_COUNT - 1;
                prop_assert_eq!(control == StreamControl::Close, expect_close);
            }
            let is_inferred = matches!(job.phase(), JobPhase::Completed { inferred: true, .. });
            prop_assert!(is_inferred);
        }

        #[test]
        fn terminal_phase_is_frozen(updates in proptest::collection::vec(arb_update(), 1..20)) {
            let mut job = JobProgress::new();
            job.apply(&ProgressEvent::Error(Failure {
                error: "boom".to_string(),
                failed_step: None,
                batch_index: None,
            }));
            let steps = job.steps().clone();
            let phase = job.phase().clone();

            for (index, status) in updates {
                let control = job.apply(&update(StepId::ALL[index].short_name(), status));
                prop_assert_eq!(control, StreamControl::Close);
            }
            prop_assert_eq!(job.steps(), &steps);
            prop_assert_eq!(job.phase(), &phase);
        }
    }
}
