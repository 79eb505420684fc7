//! Track domain types
//!
//! A personalized track is the artifact produced by one generation job.
//! The backend owns it; these are the read models the console fetches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Full track record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub qa_report_id: Option<Uuid>,
    #[serde(default)]
    pub track_data: Map<String, Value>,
    #[serde(default)]
    pub generation_metadata: Option<GenerationMetadata>,
    pub algorithm_version: String,
    pub validation_b8: Option<Map<String, Value>>,
    pub status: TrackStatus,
    pub error_message: Option<String>,
    pub generation_duration_sec: Option<f64>,
    pub batch_index: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Track {
    /// Typed view over the artifact sections present in `track_data`
    pub fn artifacts(&self) -> TrackArtifacts {
        serde_json::from_value(Value::Object(self.track_data.clone())).unwrap_or_default()
    }
}

/// Track listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub topic: Option<String>,
    pub algorithm_version: String,
    pub status: TrackStatus,
    pub generation_duration_sec: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Persisted track status as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Pending,
    Running,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TrackStatus {
    /// Whether the backend will never change this track again
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TrackStatus::Completed | TrackStatus::Cancelled | TrackStatus::Failed
        )
    }
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrackStatus::Pending => "pending",
            TrackStatus::Running => "running",
            TrackStatus::Cancelling => "cancelling",
            TrackStatus::Completed => "completed",
            TrackStatus::Cancelled => "cancelled",
            TrackStatus::Failed => "failed",
            TrackStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Generation bookkeeping recorded by the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationMetadata {
    pub algorithm_version: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub steps_log: Vec<StepLogEntry>,
    pub llm_calls_count: u64,
    pub total_tokens: u64,
    pub total_duration_sec: f64,
}

/// Per-step line of the generation metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub step_name: String,
    pub duration_sec: f64,
    #[serde(default)]
    pub tokens_used: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Stored log of one pipeline step for a track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    pub id: Uuid,
    pub track_id: Uuid,
    pub step_name: String,
    #[serde(default)]
    pub step_output: Map<String, Value>,
    #[serde(default)]
    pub llm_calls: Vec<Value>,
    pub step_duration_sec: f64,
    pub error_message: Option<String>,
}

/// Which profile fields the pipeline consumed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldUsage {
    pub track_id: Uuid,
    pub used_fields: Vec<FieldUsageItem>,
    pub unused_fields: Vec<FieldUsageItem>,
    #[serde(default)]
    pub total_fields: usize,
    #[serde(default)]
    pub used_count: usize,
    #[serde(default)]
    pub unused_count: usize,
    #[serde(default)]
    pub critical_unused_count: usize,
    #[serde(default)]
    pub important_unused_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldUsageItem {
    pub field_name: String,
    pub used: bool,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default = "default_criticality")]
    pub criticality: String,
}

fn default_criticality() -> String {
    "OPTIONAL".to_string()
}

// =============================================================================
// Artifacts (track_data sections)
// =============================================================================

/// Typed subset of `track_data`, enough for the console viewers
///
/// Every section is optional; a track that failed mid-pipeline only has the
/// sections of the steps that finished.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackArtifacts {
    pub competency_set: Option<CompetencySet>,
    pub ksa_matrix: Option<KsaMatrix>,
    pub learning_units: Option<LearningUnits>,
    pub hierarchy: Option<Hierarchy>,
    pub lesson_blueprints: Option<LessonBlueprints>,
    pub schedule: Option<Schedule>,
    pub validation: Option<Validation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompetencySet {
    pub competencies: Vec<Competency>,
    pub integral_competency_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Competency {
    pub id: String,
    pub title: String,
    pub description: String,
    pub level: String,
    pub related_task_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KsaMatrix {
    pub knowledge_items: Vec<KsaItem>,
    pub skill_items: Vec<KsaItem>,
    pub habit_items: Vec<KsaItem>,
    pub dependency_graph: Vec<KsaDependency>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KsaItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KsaDependency {
    pub from_id: String,
    pub to_id: String,
    pub dependency_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LearningUnits {
    pub theory_units: Vec<Value>,
    pub practice_units: Vec<Value>,
    pub automation_units: Vec<Value>,
    pub clusters: Vec<LearningUnitCluster>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LearningUnitCluster {
    pub id: String,
    pub title: String,
    pub total_minutes: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Hierarchy {
    pub levels: Vec<TrackLevel>,
    pub unit_sequence: Vec<String>,
    pub time_compression_applied: bool,
    pub total_weeks: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackLevel {
    pub level: String,
    pub clusters: Vec<String>,
    pub estimated_weeks: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LessonBlueprints {
    pub blueprints: Vec<LessonBlueprint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LessonBlueprint {
    pub id: String,
    pub cluster_id: String,
    pub problem_formulation: ProblemFormulation,
    pub practice_tasks: Vec<String>,
    pub reflection_questions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProblemFormulation {
    pub problem_statement: String,
    pub expected_hypotheses: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub weeks: Vec<TrackWeek>,
    pub total_weeks: u32,
    pub checkpoints: Vec<ScheduleCheckpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackWeek {
    pub week_number: u32,
    pub level: String,
    pub theme: String,
    pub weekly_goals: Vec<String>,
    pub days: Vec<TrackDay>,
    pub checkpoint: Option<ScheduleCheckpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackDay {
    pub day_of_week: String,
    pub learning_units: Vec<String>,
    pub total_minutes: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleCheckpoint {
    pub week_number: u32,
    pub title: String,
    pub assessment_tasks: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Validation {
    pub overall_valid: bool,
    pub checks: Vec<ValidationCheck>,
    pub critical_failures: u32,
    pub warnings: u32,
    pub final_status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidationCheck {
    pub check_name: String,
    pub passed: bool,
    pub severity: String,
    pub message: String,
}
