//! Cross-job comparison of step results

use serde_json::Value;

use crate::domain::step::{StepId, StepStatus};

use super::job::JobProgress;

/// Placeholder for a value a job did not report
pub const MISSING_VALUE: &str = "—";

/// Step result metrics of every job in a batch, side by side
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonTable {
    pub step: StepId,
    pub rows: Vec<ComparisonRow>,
    /// Step duration per job
    pub durations: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub key: &'static str,
    /// Rendered value per job, [`MISSING_VALUE`] when absent
    pub values: Vec<String>,
    /// Not every job reported the same value
    pub differs: bool,
}

impl ComparisonRow {
    /// Key with underscores turned into spaces
    pub fn label(&self) -> String {
        self.key.replace('_', " ")
    }
}

impl ComparisonTable {
    /// Build the table for `step`
    ///
    /// Returns `None` until every job has completed the step, and for an
    /// empty job list.
    pub fn build(step: StepId, jobs: &[JobProgress]) -> Option<Self> {
        if jobs.is_empty()
            || jobs
                .iter()
                .any(|job| job.step(step).status != StepStatus::Completed)
        {
            return None;
        }

        let rows = step
            .comparison_keys()
            .iter()
            .map(|&key| {
                let values: Vec<String> = jobs
                    .iter()
                    .map(|job| display_value(job.step(step).summary.get(key)))
                    .collect();
                let differs = values.iter().any(|v| v != &values[0]);
                ComparisonRow {
                    key,
                    values,
                    differs,
                }
            })
            .collect();

        Some(Self {
            step,
            rows,
            durations: jobs
                .iter()
                .map(|job| job.step(step).duration_seconds)
                .collect(),
        })
    }

    pub fn has_differences(&self) -> bool {
        self.rows.iter().any(|row| row.differs)
    }
}

/// Render a summary value for display and comparison
///
/// Strings are shown bare, other values as JSON text.
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => MISSING_VALUE.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ProgressEvent, StepUpdate};
    use serde_json::json;

    fn job_with(step: StepId, status: StepStatus, summary: Value, duration: Option<f64>) -> JobProgress {
        let mut job = JobProgress::new();
        job.apply(&ProgressEvent::StepUpdate(StepUpdate {
            step: step.short_name().to_string(),
            status,
            description: None,
            duration_sec: duration,
            tokens_used: None,
            summary: summary.as_object().cloned(),
            track_id: None,
            batch_index: None,
        }));
        job
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(None), "—");
        assert_eq!(display_value(Some(&Value::Null)), "—");
        assert_eq!(display_value(Some(&json!("beginner"))), "beginner");
        assert_eq!(display_value(Some(&json!(12))), "12");
        assert_eq!(display_value(Some(&json!(true))), "true");
    }

    #[test]
    fn test_hidden_until_all_jobs_complete() {
        let jobs = vec![
            job_with(StepId::B1, StepStatus::Completed, json!({}), None),
            job_with(StepId::B1, StepStatus::Running, json!({}), None),
        ];
        assert!(ComparisonTable::build(StepId::B1, &jobs).is_none());
    }

    #[test]
    fn test_rows_follow_whitelist_and_flag_differences() {
        let jobs = vec![
            job_with(
                StepId::B1,
                StepStatus::Completed,
                json!({"effective_level": "beginner", "estimated_weeks": 8, "noise": 1}),
                Some(2.1),
            ),
            job_with(
                StepId::B1,
                StepStatus::Completed,
                json!({"effective_level": "beginner", "estimated_weeks": 10}),
                None,
            ),
        ];

        let table = ComparisonTable::build(StepId::B1, &jobs).unwrap();
        let keys: Vec<_> = table.rows.iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["effective_level", "estimated_weeks"]);

        assert!(!table.rows[0].differs);
        assert_eq!(table.rows[0].values, vec!["beginner", "beginner"]);
        assert!(table.rows[1].differs);
        assert_eq!(table.rows[1].label(), "estimated weeks");
        assert_eq!(table.durations, vec![Some(2.1), None]);
        assert!(table.has_differences());
    }

    #[test]
    fn test_missing_values_compare_as_placeholder() {
        let jobs = vec![
            job_with(StepId::B6, StepStatus::Completed, json!({}), None),
            job_with(StepId::B6, StepStatus::Completed, json!({"blueprints_count": null}), None),
        ];
        let table = ComparisonTable::build(StepId::B6, &jobs).unwrap();
        assert_eq!(table.rows[0].values, vec!["—", "—"]);
        assert!(!table.rows[0].differs);
    }

    #[test]
    fn test_string_and_number_with_same_text_are_equal() {
        let jobs = vec![
            job_with(StepId::B2, StepStatus::Completed, json!({"competencies_count": "5"}), None),
            job_with(StepId::B2, StepStatus::Completed, json!({"competencies_count": 5}), None),
        ];
        let table = ComparisonTable::build(StepId::B2, &jobs).unwrap();
        assert!(!table.rows[0].differs);
    }
}
