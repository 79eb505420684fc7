//! Profile DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::profile::{ProfileSummary, ValidationResult};

/// Response to a multipart profile upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUploaded {
    pub id: Uuid,
    pub filename: String,
    pub topic: String,
    pub experience_level: Option<String>,
    pub validation_result: ValidationResult,
    pub created_at: DateTime<Utc>,
}

/// Response to a form create or update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSaved {
    pub id: Uuid,
    pub topic: String,
    pub experience_level: Option<String>,
    pub validation_result: ValidationResult,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Envelope of the profile listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileList {
    pub profiles: Vec<ProfileSummary>,
}
