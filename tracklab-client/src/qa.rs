//! QA report API endpoints

use crate::TrackLabClient;
use crate::error::{ClientError, Result};
use tracklab_core::domain::qa::{QaReport, QaReportSummary};
use tracklab_core::dto::qa::{GenerateQaBatch, QaBatchStarted, QaReportList};
use tracklab_core::dto::track::{MAX_BATCH_SIZE, MIN_BATCH_SIZE};
use uuid::Uuid;

impl TrackLabClient {
    // =============================================================================
    // QA Stability Reports
    // =============================================================================

    /// Start a QA batch: generate several tracks and compare their stability
    pub async fn generate_qa_batch(&self, profile_id: Uuid, batch_size: usize) -> Result<QaBatchStarted> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(ClientError::InvalidRequest(format!(
                "batch size must be between {} and {}, got {}",
                MIN_BATCH_SIZE, MAX_BATCH_SIZE, batch_size
            )));
        }

        let url = format!("{}/api/qa/generate-batch", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateQaBatch {
                profile_id,
                batch_size,
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List QA reports, optionally for one profile
    pub async fn list_qa_reports(&self, profile_id: Option<Uuid>) -> Result<Vec<QaReportSummary>> {
        let url = format!("{}/api/qa/reports", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(profile_id) = profile_id {
            request = request.query(&[("profile_id", profile_id.to_string())]);
        }
        let response = request.send().await?;

        let list: QaReportList = self.handle_response(response).await?;
        Ok(list.reports)
    }

    /// Get a QA report by ID
    pub async fn get_qa_report(&self, report_id: Uuid) -> Result<QaReport> {
        let url = format!("{}/api/qa/reports/{}", self.base_url, report_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
