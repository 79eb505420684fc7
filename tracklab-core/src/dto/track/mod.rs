//! Track generation DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::track::TrackSummary;

/// Smallest batch the backend accepts
pub const MIN_BATCH_SIZE: usize = 2;
/// Largest batch the backend accepts
pub const MAX_BATCH_SIZE: usize = 5;

/// Request to generate a single track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateTrack {
    pub profile_id: Uuid,
}

/// Request to generate several tracks from one profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateBatch {
    pub profile_id: Uuid,
    pub batch_size: usize,
}

impl GenerateBatch {
    /// Build a batch request, rejecting sizes the backend would refuse
    pub fn new(profile_id: Uuid, batch_size: usize) -> Result<Self, String> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(format!(
                "batch size must be between {} and {}, got {}",
                MIN_BATCH_SIZE, MAX_BATCH_SIZE, batch_size
            ));
        }
        Ok(Self {
            profile_id,
            batch_size,
        })
    }
}

/// Response once single-track generation has been accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStarted {
    pub track_id: Uuid,
    pub status: String,
    pub progress_url: String,
}

/// Response once batch generation has been accepted
///
/// `track_ids[i]` is the track generated as batch index `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStarted {
    pub batch_id: Uuid,
    pub track_ids: Vec<Uuid>,
    pub status: String,
    pub progress_url: String,
}

/// Acknowledgement of a cancel request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAccepted {
    pub status: String,
    pub track_id: Uuid,
}

/// Envelope of the track listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackList {
    pub tracks: Vec<TrackSummary>,
    #[serde(default)]
    pub total: usize,
}
