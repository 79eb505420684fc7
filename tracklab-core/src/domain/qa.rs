//! QA report domain types
//!
//! A QA report measures how stable the pipeline output is when the same
//! profile is generated several times.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaReport {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub report_data: Option<QaReportData>,
    pub batch_size: u32,
    pub completed_count: u32,
    pub mean_cdv: Option<f64>,
    pub cdv_std: Option<f64>,
    pub recommendation: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaReportSummary {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub batch_size: u32,
    pub completed_count: u32,
    pub mean_cdv: Option<f64>,
    pub recommendation: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QaReportData {
    pub cdv_matrix: Vec<CdvPair>,
    pub topic_frequency: Vec<TopicFrequency>,
    pub top_stable_topics: Vec<String>,
    pub top_unstable_topics: Vec<String>,
    pub mean_cdv: f64,
    pub cdv_std: f64,
    pub recommendation: String,
    pub generated_at: String,
}

/// Content divergence between two generated versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdvPair {
    pub version_a_id: String,
    pub version_b_id: String,
    pub cdv_total: f64,
    pub cdv_topics: f64,
    pub cdv_subtopics: f64,
    pub cdv_activities: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicFrequency {
    pub topic_name: String,
    pub count: u32,
    pub total_versions: u32,
    pub frequency_pct: f64,
}
