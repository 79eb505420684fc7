//! Manual debug mode domain types
//!
//! Manual mode lets an operator run single pipeline steps against a frozen
//! profile snapshot, iterate on prompt versions and rate the results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::step::StepStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualSession {
    pub id: Uuid,
    pub profile_id: Uuid,
    #[serde(default)]
    pub profile_snapshot: Map<String, Value>,
    pub name: String,
    pub description: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Archived,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => f.write_str("active"),
            SessionStatus::Archived => f.write_str("archived"),
        }
    }
}

/// One isolated execution of a pipeline step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub id: Uuid,
    pub session_id: Uuid,
    pub step_name: String,
    pub run_number: u32,
    pub prompt_version_id: Option<Uuid>,
    pub rendered_prompt: Option<String>,
    pub input_data: Option<Map<String, Value>>,
    pub profile_variables: Option<Map<String, Value>>,
    pub llm_params: Option<Map<String, Value>>,
    pub raw_response: Option<String>,
    pub parsed_result: Option<Map<String, Value>>,
    pub parse_error: Option<String>,
    pub tokens_used: Option<u64>,
    pub duration_ms: Option<f64>,
    pub status: StepStatus,
    pub preprocessor_results: Option<Vec<ProcessorRunResult>>,
    pub postprocessor_results: Option<Vec<ProcessorRunResult>>,
    pub auto_evaluation: Option<Map<String, Value>>,
    pub llm_judge_evaluation: Option<Map<String, Value>>,
    pub user_rating: Option<u8>,
    pub user_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRunSummary {
    pub id: Uuid,
    pub run_number: u32,
    pub status: String,
    pub duration_ms: Option<f64>,
    pub tokens_used: Option<u64>,
    pub user_rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// Per-step roll-up inside a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStepStatus {
    pub run_count: u32,
    pub status: String,
    pub last_run_id: Option<Uuid>,
    pub last_rating: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStepsStatus {
    pub steps: BTreeMap<String, SessionStepStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorRunResult {
    pub name: String,
    pub passed: bool,
    pub output: Option<Map<String, Value>>,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: Uuid,
    pub step_name: String,
    pub version: u32,
    pub prompt_text: String,
    pub change_description: Option<String>,
    pub is_baseline: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptStepSummary {
    pub step_name: String,
    pub latest_version: u32,
    pub latest_prompt_id: Uuid,
    pub is_baseline: bool,
    pub created_at: DateTime<Utc>,
}

/// Registered pre/post processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProcessorKind,
    pub applicable_steps: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    Pre,
    Post,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfigItem {
    pub processor_name: String,
    pub processor_type: String,
    pub execution_order: u32,
    pub enabled: bool,
    pub config_params: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub step_name: String,
    pub processors: Vec<ProcessorConfigItem>,
}
