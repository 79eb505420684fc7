//! Track-related API endpoints

use crate::TrackLabClient;
use crate::error::{ClientError, Result};
use tracklab_core::domain::track::{FieldUsage, StepLog, Track, TrackSummary};
use tracklab_core::dto::track::{
    BatchStarted, CancelAccepted, GenerateBatch, GenerateTrack, GenerationStarted, TrackList,
};
use uuid::Uuid;

impl TrackLabClient {
    // =============================================================================
    // Generation
    // =============================================================================

    /// Start generating a track from a profile
    ///
    /// # Example
    /// ```no_run
    /// # use tracklab_client::TrackLabClient;
    /// # use uuid::Uuid;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = TrackLabClient::new("http://localhost:8000");
    /// let started = client.generate_track(Uuid::new_v4()).await?;
    /// println!("progress at {}", started.progress_url);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn generate_track(&self, profile_id: Uuid) -> Result<GenerationStarted> {
        let url = format!("{}/api/tracks/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateTrack { profile_id })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Start generating `batch_size` tracks from one profile
    ///
    /// Sizes outside the accepted range are rejected without a request.
    pub async fn generate_batch(&self, profile_id: Uuid, batch_size: usize) -> Result<BatchStarted> {
        let request =
            GenerateBatch::new(profile_id, batch_size).map_err(ClientError::InvalidRequest)?;

        let url = format!("{}/api/tracks/generate-batch", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;

        self.handle_response(response).await
    }

    /// Ask the backend to cancel a running generation
    ///
    /// The acknowledgement only means the request was accepted; the job
    /// stops when its progress stream reports `cancelled`.
    pub async fn cancel_track(&self, track_id: Uuid) -> Result<CancelAccepted> {
        let url = format!("{}/api/tracks/{}/cancel", self.base_url, track_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Retrieval
    // =============================================================================

    /// List tracks, optionally filtered by profile and status
    pub async fn list_tracks(
        &self,
        profile_id: Option<Uuid>,
        status: Option<&str>,
    ) -> Result<Vec<TrackSummary>> {
        let url = format!("{}/api/tracks", self.base_url);
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(profile_id) = profile_id {
            query.push(("profile_id", profile_id.to_string()));
        }
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        let response = self.client.get(&url).query(&query).send().await?;

        let list: TrackList = self.handle_response(response).await?;
        Ok(list.tracks)
    }

    /// Get a track with its generated artifacts
    pub async fn get_track(&self, track_id: Uuid) -> Result<Track> {
        let url = format!("{}/api/tracks/{}", self.base_url, track_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Which profile fields each step consumed
    pub async fn field_usage(&self, track_id: Uuid) -> Result<FieldUsage> {
        let url = format!("{}/api/tracks/{}/field-usage", self.base_url, track_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Per-step generation logs of a track, in execution order
    pub async fn track_logs(&self, track_id: Uuid) -> Result<Vec<StepLog>> {
        let url = format!("{}/api/logs/track/{}", self.base_url, track_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Export
    // =============================================================================

    /// Download URL of a track export
    pub fn track_export_url(&self, track_id: Uuid) -> String {
        format!("{}/api/export/tracks/{}", self.base_url, track_id)
    }

    /// Download URL of a QA report export
    pub fn qa_report_export_url(&self, report_id: Uuid) -> String {
        format!("{}/api/export/qa-reports/{}", self.base_url, report_id)
    }

    /// Download URL of a QA report export including every generated track
    pub fn qa_report_full_export_url(&self, report_id: Uuid) -> String {
        format!("{}/api/export/qa-reports/{}/all", self.base_url, report_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_urls() {
        let client = TrackLabClient::new("http://backend:8000/");
        let id = Uuid::nil();
        assert_eq!(
            client.track_export_url(id),
            format!("http://backend:8000/api/export/tracks/{}", id)
        );
        assert!(client.qa_report_full_export_url(id).ends_with("/all"));
    }

    #[tokio::test]
    async fn test_invalid_batch_size_is_rejected_locally() {
        // nothing listens here; the request must fail before any I/O
        let client = TrackLabClient::new("http://127.0.0.1:9");
        let err = client.generate_batch(Uuid::new_v4(), 9).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }
}
