//! QA DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::qa::QaReportSummary;

/// Request to run a QA stability batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateQaBatch {
    pub profile_id: Uuid,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaBatchStarted {
    pub report_id: Uuid,
    pub profile_id: Uuid,
    pub batch_size: usize,
    pub status: String,
    pub progress_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaReportList {
    pub reports: Vec<QaReportSummary>,
}
