//! Manual debug mode DTOs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::manual::{ManualSession, ProcessorConfigItem, PromptStepSummary, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    pub profile_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Partial session update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_snapshot: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<ManualSession>,
    pub total: usize,
}

/// Parameters of an isolated step run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStep {
    pub prompt_version_id: Option<Uuid>,
    pub custom_prompt: Option<String>,
    pub input_data: Option<Map<String, Value>>,
    pub llm_params: Option<Map<String, Value>>,
    pub run_preprocessors: bool,
    pub run_postprocessors: bool,
    pub use_mock: bool,
}

impl Default for RunStep {
    fn default() -> Self {
        Self {
            prompt_version_id: None,
            custom_prompt: None,
            input_data: None,
            llm_params: None,
            run_preprocessors: true,
            run_postprocessors: true,
            use_mock: true,
        }
    }
}

/// Operator rating of a run; `None` clears it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRun {
    pub user_rating: Option<u8>,
    pub user_notes: Option<String>,
}

impl RateRun {
    pub fn new(user_rating: Option<u8>, user_notes: Option<String>) -> Result<Self, String> {
        match user_rating {
            Some(rating) if !(1..=5).contains(&rating) => {
                return Err(format!("rating must be between 1 and 5, got {}", rating));
            }
            _ => {}
        }
        Ok(Self {
            user_rating,
            user_notes,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePromptVersion {
    pub prompt_text: String,
    pub change_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptList {
    pub steps: Vec<PromptStepSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetProcessors {
    pub processors: Vec<ProcessorConfigItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(RateRun::new(Some(0), None).is_err());
        assert!(RateRun::new(Some(6), None).is_err());
        assert!(RateRun::new(Some(3), Some("ok".into())).is_ok());
        assert!(RateRun::new(None, None).is_ok());
    }

    #[test]
    fn test_partial_session_update_omits_absent_fields() {
        let update = UpdateSession {
            status: Some(SessionStatus::Archived),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"status": "archived"}));
    }
}
