//! Progress event streams
//!
//! The backend publishes generation progress as `text/event-stream`.
//! [`SseDecoder`] splits the byte stream into frames, [`ProgressStream`]
//! owns the connection, reconnects after transport failures and decodes
//! frames into [`ProgressEvent`]s.
//!
//! Transport failures are not hidden: each one is yielded as
//! [`StreamItem::TransportError`] so the progress reducer can decide when
//! to give up. The stream only reconnects when it is polled again.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, warn};
use tracklab_core::events::ProgressEvent;
use uuid::Uuid;

use crate::TrackLabClient;
use crate::error::error_message;

/// Default pause before reconnecting a dropped stream
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name, `message` when the frame had none
    pub event: String,
    /// Data lines joined with `\n`
    pub data: String,
    /// Last event id seen so far
    pub id: Option<String>,
}

/// Incremental `text/event-stream` parser
///
/// Accepts arbitrary chunk boundaries, `\n`, `\r\n` and `\r` line endings,
/// comment lines, multi-line data and the `id`/`retry` fields.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: String,
    data: Vec<String>,
    last_event_id: Option<String>,
    retry: Option<Duration>,
    seen_first_line: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(line) = self.take_line() {
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Id to resume from after a reconnect
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Reconnect delay requested by the server
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Drop a partially received frame, keeping the resume state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.event.clear();
        self.data.clear();
        self.seen_first_line = false;
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r')?;
        let skip = match self.buffer[end] {
            b'\r' => match self.buffer.get(end + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                // a lone CR at the end of the buffer may be half of CRLF
                None => return None,
            },
            _ => 1,
        };

        let line: Vec<u8> = self.buffer.drain(..end + skip).take(end).collect();
        let mut line = String::from_utf8_lossy(&line).into_owned();
        if !self.seen_first_line {
            self.seen_first_line = true;
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string();
            }
        }
        Some(line)
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = value.to_string(),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = std::mem::take(&mut self.event);
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");

        Some(SseFrame {
            event: if event.is_empty() {
                "message".to_string()
            } else {
                event
            },
            data,
            id: self.last_event_id.clone(),
        })
    }
}

/// What a progress feed yields
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(ProgressEvent),
    /// The connection failed or ended; polling again reconnects
    TransportError(String),
}

/// Source of progress items for a job or batch view
///
/// Implemented by [`ProgressStream`]; views take any feed so they can be
/// driven by scripted items in tests.
#[async_trait]
pub trait ProgressFeed: Send {
    /// Next item, or `None` once the feed is closed
    async fn next_item(&mut self) -> Option<StreamItem>;

    /// Release the connection; later calls to `next_item` return `None`
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Pause before reconnecting, unless the server sent `retry`
    pub reconnect_delay: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Live progress stream of one job or batch
pub struct ProgressStream {
    client: reqwest::Client,
    url: String,
    options: StreamOptions,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
    body: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    connections: u32,
    closed: bool,
}

impl std::fmt::Debug for ProgressStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStream")
            .field("url", &self.url)
            .field("connected", &self.body.is_some())
            .field("connections", &self.connections)
            .field("closed", &self.closed)
            .finish()
    }
}

impl ProgressStream {
    fn new(client: reqwest::Client, url: String, options: StreamOptions) -> Self {
        Self {
            client,
            url,
            options,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            body: None,
            connections: 0,
            closed: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of connection attempts made so far
    pub fn connections(&self) -> u32 {
        self.connections
    }

    /// Next decoded event or transport failure
    pub async fn next(&mut self) -> Option<StreamItem> {
        loop {
            if self.closed {
                return None;
            }

            if let Some(frame) = self.pending.pop_front() {
                match ProgressEvent::decode(&frame.event, &frame.data) {
                    Ok(Some(event)) => return Some(StreamItem::Event(event)),
                    Ok(None) => debug!(event = %frame.event, "Ignoring unknown event"),
                    Err(e) => warn!(error = %e, "Skipping malformed progress event"),
                }
                continue;
            }

            let Some(body) = self.body.as_mut() else {
                if let Err(reason) = self.connect().await {
                    return Some(StreamItem::TransportError(reason));
                }
                continue;
            };

            match body.next().await {
                Some(Ok(chunk)) => {
                    let frames = self.decoder.feed(&chunk);
                    self.pending.extend(frames);
                }
                Some(Err(e)) => {
                    self.disconnect();
                    return Some(StreamItem::TransportError(e.to_string()));
                }
                None => {
                    self.disconnect();
                    return Some(StreamItem::TransportError(
                        "connection closed by server".to_string(),
                    ));
                }
            }
        }
    }

    /// Drop the connection for good
    pub fn close(&mut self) {
        if !self.closed {
            debug!(url = %self.url, "Closing progress stream");
        }
        self.closed = true;
        self.disconnect();
        self.pending.clear();
    }

    async fn connect(&mut self) -> Result<(), String> {
        if self.connections > 0 {
            let delay = self.decoder.retry().unwrap_or(self.options.reconnect_delay);
            tokio::time::sleep(delay).await;
        }
        self.connections += 1;

        let mut request = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        if let Some(id) = self.decoder.last_event_id() {
            request = request.header("Last-Event-ID", id);
        }

        debug!(url = %self.url, attempt = self.connections, "Connecting progress stream");
        let response = request.send().await.map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_message(status.as_u16(), &body));
        }

        self.body = Some(response.bytes_stream().boxed());
        Ok(())
    }

    fn disconnect(&mut self) {
        self.body = None;
        self.decoder.reset();
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl ProgressFeed for ProgressStream {
    async fn next_item(&mut self) -> Option<StreamItem> {
        self.next().await
    }

    fn close(&mut self) {
        ProgressStream::close(self);
    }
}

impl TrackLabClient {
    // =============================================================================
    // Progress Streams
    // =============================================================================

    /// Progress stream of a single track
    pub fn track_progress(&self, track_id: Uuid, options: StreamOptions) -> ProgressStream {
        let url = format!("{}/api/tracks/{}/progress", self.base_url, track_id);
        ProgressStream::new(self.client.clone(), url, options)
    }

    /// Shared progress stream of every track in a batch
    pub fn batch_progress(&self, batch_id: Uuid, options: StreamOptions) -> ProgressStream {
        let url = format!("{}/api/tracks/batch/{}/progress", self.base_url, batch_id);
        ProgressStream::new(self.client.clone(), url, options)
    }

    /// Stream at a `progress_url` returned by a generation request
    ///
    /// Relative URLs are resolved against the client's base URL.
    pub fn progress_at(&self, progress_url: &str, options: StreamOptions) -> ProgressStream {
        let url = if progress_url.starts_with("http://") || progress_url.starts_with("https://") {
            progress_url.to_string()
        } else {
            format!("{}/{}", self.base_url, progress_url.trim_start_matches('/'))
        };
        ProgressStream::new(self.client.clone(), url, options)
    }
}
