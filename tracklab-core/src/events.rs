//! Progress stream events
//!
//! The backend reports generation progress as named server-sent events with
//! JSON payloads. [`ProgressEvent::decode`] turns one (name, data) pair into
//! a typed event, ignoring names it does not know.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::step::StepStatus;

/// Payload that did not match its event's schema
#[derive(Debug, Error)]
#[error("malformed `{event}` payload: {source}")]
pub struct EventDecodeError {
    pub event: String,
    #[source]
    pub source: serde_json::Error,
}

/// One decoded progress event
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StepUpdate(StepUpdate),
    Complete(Completion),
    Cancelled(Cancellation),
    Error(Failure),
    BatchComplete(BatchCompletion),
}

/// `step_update`: new state for one step, fields absent keep their old value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub step: String,
    pub status: StepStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub summary: Option<Map<String, Value>>,
    #[serde(default)]
    pub track_id: Option<Uuid>,
    #[serde(default)]
    pub batch_index: Option<i64>,
}

/// `complete`: the job finished
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(default)]
    pub total_duration_sec: Option<f64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub batch_index: Option<i64>,
}

/// `cancelled`: the job stopped on request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub last_step: Option<String>,
    #[serde(default)]
    pub batch_index: Option<i64>,
}

/// `error`: the backend gave up on the job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(default = "unknown_error")]
    pub error: String,
    #[serde(default)]
    pub failed_step: Option<String>,
    #[serde(default)]
    pub batch_index: Option<i64>,
}

fn unknown_error() -> String {
    "Unknown error".to_string()
}

/// `batch_complete`: final status of every job in a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchCompletion {
    #[serde(default)]
    pub results: Vec<BatchResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    #[serde(default)]
    pub track_id: Option<Uuid>,
    pub batch_index: i64,
    pub status: String,
    #[serde(default)]
    pub duration_sec: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Unnamed snapshot events sent by the older single-track endpoint
#[derive(Debug, Deserialize)]
struct LegacySnapshot {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    step: Option<String>,
    #[serde(default)]
    step_status: Option<StepStatus>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    track_id: Option<Uuid>,
}

impl ProgressEvent {
    /// Decode a named event
    ///
    /// Returns `Ok(None)` for event names outside the protocol and for
    /// snapshots that carry no state change.
    pub fn decode(event: &str, data: &str) -> Result<Option<ProgressEvent>, EventDecodeError> {
        let parsed = match event {
            "step_update" => parse(event, data).map(ProgressEvent::StepUpdate)?,
            "complete" => parse(event, data).map(ProgressEvent::Complete)?,
            "cancelled" => parse(event, data).map(ProgressEvent::Cancelled)?,
            "error" => parse(event, data).map(ProgressEvent::Error)?,
            "batch_complete" => parse(event, data).map(ProgressEvent::BatchComplete)?,
            "" | "message" => return Ok(parse::<LegacySnapshot>(event, data)?.into_event()),
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::StepUpdate(_) => "step_update",
            ProgressEvent::Complete(_) => "complete",
            ProgressEvent::Cancelled(_) => "cancelled",
            ProgressEvent::Error(_) => "error",
            ProgressEvent::BatchComplete(_) => "batch_complete",
        }
    }

    /// Batch index the event is addressed to, if any
    pub fn batch_index(&self) -> Option<i64> {
        match self {
            ProgressEvent::StepUpdate(e) => e.batch_index,
            ProgressEvent::Complete(e) => e.batch_index,
            ProgressEvent::Cancelled(e) => e.batch_index,
            ProgressEvent::Error(e) => e.batch_index,
            ProgressEvent::BatchComplete(_) => None,
        }
    }
}

impl LegacySnapshot {
    fn into_event(self) -> Option<ProgressEvent> {
        if let (Some(step), Some(status)) = (self.step.clone(), self.step_status) {
            return Some(ProgressEvent::StepUpdate(StepUpdate {
                step,
                status,
                description: None,
                duration_sec: self.duration,
                tokens_used: None,
                summary: None,
                track_id: self.track_id,
                batch_index: None,
            }));
        }

        match self.status.as_deref() {
            Some("completed") => Some(ProgressEvent::Complete(Completion::default())),
            Some("failed") => Some(ProgressEvent::Error(Failure {
                error: self
                    .error
                    .unwrap_or_else(|| "Generation failed".to_string()),
                failed_step: None,
                batch_index: None,
            })),
            Some("cancelled") => Some(ProgressEvent::Cancelled(Cancellation::default())),
            Some(_) => None,
            None => self.error.map(|error| {
                ProgressEvent::Error(Failure {
                    error,
                    failed_step: None,
                    batch_index: None,
                })
            }),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> Result<T, EventDecodeError> {
    serde_json::from_str(data).map_err(|source| EventDecodeError {
        event: event.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_step_update_with_optional_fields() {
        let event = ProgressEvent::decode(
            "step_update",
            r#"{"step": "B2", "status": "completed", "duration_sec": 3.5,
                "tokens_used": 1200, "summary": {"competencies_count": 6}}"#,
        )
        .unwrap()
        .unwrap();

        match event {
            ProgressEvent::StepUpdate(update) => {
                assert_eq!(update.step, "B2");
                assert_eq!(update.status, StepStatus::Completed);
                assert_eq!(update.duration_sec, Some(3.5));
                assert_eq!(update.tokens_used, Some(1200));
                assert_eq!(update.summary.unwrap()["competencies_count"], 6);
                assert_eq!(update.batch_index, None);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_names_are_ignored() {
        assert!(ProgressEvent::decode("heartbeat", "{}").unwrap().is_none());
        assert!(ProgressEvent::decode("ping", "not json").unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let err = ProgressEvent::decode("step_update", r#"{"step": "B1"}"#).unwrap_err();
        assert_eq!(err.event, "step_update");

        let err = ProgressEvent::decode("complete", "{").unwrap_err();
        assert!(err.to_string().contains("complete"));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(ProgressEvent::decode("step_update", r#"{"step": "B1", "status": "done"}"#).is_err());
    }

    #[test]
    fn test_error_event_defaults_message() {
        let event = ProgressEvent::decode("error", "{}").unwrap().unwrap();
        assert_eq!(
            event,
            ProgressEvent::Error(Failure {
                error: "Unknown error".to_string(),
                failed_step: None,
                batch_index: None,
            })
        );
    }

    #[test]
    fn test_batch_events_carry_index() {
        let event = ProgressEvent::decode(
            "cancelled",
            r#"{"completed_steps": ["B1", "B2"], "last_step": "B3", "batch_index": 1}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.batch_index(), Some(1));
        assert_eq!(event.name(), "cancelled");
    }

    #[test]
    fn test_batch_complete_results() {
        let event = ProgressEvent::decode(
            "batch_complete",
            r#"{"results": [
                {"track_id": null, "batch_index": 0, "status": "completed", "duration_sec": 40.2},
                {"batch_index": 1, "status": "failed", "error": "LLM timeout"}
            ]}"#,
        )
        .unwrap()
        .unwrap();

        let ProgressEvent::BatchComplete(done) = event else {
            panic!("expected batch_complete");
        };
        assert_eq!(done.results.len(), 2);
        assert_eq!(done.results[1].error.as_deref(), Some("LLM timeout"));
    }

    #[test]
    fn test_legacy_snapshots() {
        let done = ProgressEvent::decode("message", r#"{"status": "completed", "track_id": null}"#)
            .unwrap()
            .unwrap();
        assert_eq!(done.name(), "complete");

        let failed = ProgressEvent::decode("message", r#"{"status": "failed"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(failed, ProgressEvent::Error(ref f) if f.error == "Generation failed"));

        let step = ProgressEvent::decode(
            "message",
            r#"{"step": "B4", "step_status": "running", "duration": null}"#,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(step, ProgressEvent::StepUpdate(ref u) if u.step == "B4"));

        let missing = ProgressEvent::decode("message", r#"{"error": "Track not found"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(missing, ProgressEvent::Error(ref f) if f.error == "Track not found"));

        assert!(
            ProgressEvent::decode("message", r#"{"status": "running"}"#)
                .unwrap()
                .is_none()
        );
    }
}
