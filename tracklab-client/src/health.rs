//! Health check endpoint

use crate::TrackLabClient;
use crate::error::Result;
use tracklab_core::dto::health::HealthStatus;

impl TrackLabClient {
    /// Backend health, including its database and ML service reachability
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = format!("{}/api/health/", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
