//! Student profile domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Stored student profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub filename: String,
    pub topic: String,
    pub experience_level: Option<String>,
    pub data: Map<String, Value>,
    pub validation_result: ValidationResult,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub filename: String,
    pub topic: String,
    #[serde(default)]
    pub profile_name: Option<String>,
    pub experience_level: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Backend-side validation outcome attached to every stored profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Most recent track generated from a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastTrack {
    pub track_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
