//! Configuration module
//!
//! Handles CLI configuration: backend URL and the progress stream bounds.

use std::time::Duration;

use tracklab_client::{StreamOptions, TrackLabClient};
use tracklab_core::progress::ProgressLimits;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the generation backend
    pub api_url: String,
    /// Consecutive transport failures before a followed job is given up
    pub max_transport_failures: u32,
    /// Pause before reconnecting a progress stream
    pub reconnect_delay: Duration,
    /// How long a cancel request blocks another one
    pub cancel_window: Duration,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_url.is_empty() {
            anyhow::bail!("api_url cannot be empty");
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!("api_url must start with http:// or https://");
        }

        if self.max_transport_failures == 0 {
            anyhow::bail!("max_transport_failures must be greater than 0");
        }

        if self.cancel_window.is_zero() {
            anyhow::bail!("cancel_window must be greater than 0");
        }

        Ok(())
    }

    pub fn client(&self) -> TrackLabClient {
        TrackLabClient::new(&self.api_url)
    }

    pub fn limits(&self) -> ProgressLimits {
        ProgressLimits {
            max_transport_failures: self.max_transport_failures,
            cancel_window: self.cancel_window,
            ..ProgressLimits::default()
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            reconnect_delay: self.reconnect_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            api_url: "http://localhost:8000".to_string(),
            max_transport_failures: 3,
            reconnect_delay: Duration::from_millis(1000),
            cancel_window: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
        assert_eq!(config().limits().max_transport_failures, 3);
    }

    #[test]
    fn test_rejects_bad_url() {
        let mut config = config();
        config.api_url = "localhost:8000".to_string();
        assert!(config.validate().is_err());
        config.api_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_bounds() {
        let mut bad = config();
        bad.max_transport_failures = 0;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.cancel_window = Duration::ZERO;
        assert!(bad.validate().is_err());
    }
}
