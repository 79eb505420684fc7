//! Generation progress reducers
//!
//! [`JobProgress`] folds the event feed of one job, [`BatchProgress`] keeps
//! one `JobProgress` per batch index over a shared feed and derives the
//! cross-job [`ComparisonTable`]s.

pub mod batch;
pub mod comparison;
pub mod job;

use std::time::Duration;

pub use batch::{BatchPhase, BatchProgress, StepRollup};
pub use comparison::{ComparisonRow, ComparisonTable};
pub use job::{JobPhase, JobProgress};

/// Default number of consecutive transport failures tolerated per stream
pub const DEFAULT_MAX_TRANSPORT_FAILURES: u32 = 3;

/// Default time a cancel request blocks further requests
pub const DEFAULT_CANCEL_WINDOW: Duration = Duration::from_secs(10);

/// Default wait for `batch_complete` once every job of a batch has settled
pub const DEFAULT_SETTLE_GRACE: Duration = Duration::from_secs(5);

/// What the stream consumer should do after applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    Continue,
    Close,
}

impl StreamControl {
    pub fn is_close(self) -> bool {
        self == StreamControl::Close
    }
}

/// Bounds shared by the job and batch reducers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressLimits {
    pub max_transport_failures: u32,
    pub cancel_window: Duration,
    pub settle_grace: Duration,
}

impl Default for ProgressLimits {
    fn default() -> Self {
        Self {
            max_transport_failures: DEFAULT_MAX_TRANSPORT_FAILURES,
            cancel_window: DEFAULT_CANCEL_WINDOW,
            settle_grace: DEFAULT_SETTLE_GRACE,
        }
    }
}
