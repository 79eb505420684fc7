//! Progress views
//!
//! Follow a generation job or batch over its progress feed, render every
//! state change and turn Ctrl-C into a cancel request.

mod batch;
mod job;

pub use batch::follow_batch;
pub use job::follow_job;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracklab_client::TrackLabClient;
use uuid::Uuid;

/// How a follow loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// The job or batch reached a terminal phase
    Finished,
    /// The feed ended before a terminal phase
    FeedEnded,
    /// The operator interrupted twice and stopped following
    Detached,
}

/// Sends cancel requests without waiting for them
///
/// The outcome of a cancel request never changes local state; only the
/// progress feed does.
pub trait Canceller: Send + Sync {
    fn cancel(&self, track_id: Uuid);
}

/// Cancels through the backend API on a spawned task
pub struct ClientCanceller {
    client: TrackLabClient,
}

impl ClientCanceller {
    pub fn new(client: TrackLabClient) -> Self {
        Self { client }
    }
}

impl Canceller for ClientCanceller {
    fn cancel(&self, track_id: Uuid) {
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.cancel_track(track_id).await {
                Ok(ack) => debug!(%track_id, status = %ack.status, "Cancel request accepted"),
                Err(e) => warn!(%track_id, error = %e, "Cancel request failed"),
            }
        });
    }
}

/// Channel receiving one message per Ctrl-C
pub fn interrupt_channel() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tracklab_client::{ProgressFeed, StreamItem};
    use uuid::Uuid;

    use super::Canceller;

    /// Feed replaying a fixed list of items
    pub struct ScriptedFeed {
        pub items: VecDeque<StreamItem>,
        pub closed: bool,
        /// Stay silent instead of ending once the items run out
        hang: bool,
    }

    impl ScriptedFeed {
        pub fn new(items: Vec<StreamItem>) -> Self {
            Self {
                items: items.into(),
                closed: false,
                hang: false,
            }
        }

        pub fn hanging(items: Vec<StreamItem>) -> Self {
            Self {
                hang: true,
                ..Self::new(items)
            }
        }
    }

    #[async_trait]
    impl ProgressFeed for ScriptedFeed {
        async fn next_item(&mut self) -> Option<StreamItem> {
            if self.closed {
                return None;
            }
            match self.items.pop_front() {
                Some(item) => Some(item),
                None if self.hang => std::future::pending().await,
                None => None,
            }
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[derive(Default)]
    pub struct RecordingCanceller {
        pub cancelled: Mutex<Vec<Uuid>>,
    }

    impl Canceller for RecordingCanceller {
        fn cancel(&self, track_id: Uuid) {
            self.cancelled.lock().unwrap().push(track_id);
        }
    }

    pub fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }
}
