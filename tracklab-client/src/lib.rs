//! TrackLab HTTP Client
//!
//! A type-safe HTTP client for the learning-track generation backend.
//!
//! Every backend endpoint used by the console is one method on
//! [`TrackLabClient`]; generation progress is read through
//! [`ProgressStream`], which decodes the backend's server-sent events.
//!
//! # Example
//!
//! ```no_run
//! use tracklab_client::TrackLabClient;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = TrackLabClient::new("http://localhost:8000");
//!
//!     let started = client.generate_track(Uuid::new_v4()).await?;
//!     println!("Generating track {}", started.track_id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod health;
mod manual;
mod profiles;
mod qa;
pub mod stream;
mod tracks;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use stream::{ProgressFeed, ProgressStream, SseDecoder, SseFrame, StreamItem, StreamOptions};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the TrackLab backend API
///
/// Endpoints are organized into groups:
/// - Profiles (upload, form create/update, listing)
/// - Tracks (single and batch generation, cancel, listing, logs)
/// - QA stability reports
/// - Manual debug mode (sessions, step runs, prompts, processors)
/// - Progress streams
#[derive(Debug, Clone)]
pub struct TrackLabClient {
    /// Base URL of the backend (e.g., "http://localhost:8000")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl TrackLabClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use tracklab_client::TrackLabClient;
    ///
    /// let client = TrackLabClient::new("http://localhost:8000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    /// Progress streams are long-lived, so a whole-request timeout on this
    /// client also bounds how long a stream may stay open.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the backend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Non-2xx responses become [`ClientError::Api`] carrying the backend's
    /// `detail` message.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = self.check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        self.check_status(response).await?;
        Ok(())
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error::error_message(status.as_u16(), &body);
        tracing::debug!(status = status.as_u16(), %message, "API request failed");
        Err(ClientError::api_error(status.as_u16(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = TrackLabClient::new("http://localhost:8000");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = TrackLabClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = TrackLabClient::with_client("http://localhost:8000", http_client);
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
