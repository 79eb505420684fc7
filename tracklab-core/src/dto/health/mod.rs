//! Health check DTOs

use serde::{Deserialize, Serialize};

/// Backend health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub database_available: bool,
    pub ml_service_available: bool,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.database_available
    }
}
