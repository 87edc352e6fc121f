//! Server-push progress events (`text/event-stream`).
//!
//! The progress endpoint emits three event types:
//!
//! ```text
//! event: progress
//! data: {"progress": 42.5}
//!
//! event: complete
//! data: {}
//!
//! event: error
//! data: {"message": "session expired"}
//! ```
//!
//! [`SseDecoder`] turns raw body bytes into [`SseFrame`]s, and
//! [`ProgressEvent::from_frame`] maps frames onto typed events.

use serde::Deserialize;

/// Longest line the decoder buffers while waiting for its terminator.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// The server sent a line longer than the decoder accepts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event-stream line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event type; `"message"` when the server sent no `event:` field.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes may arrive split at arbitrary points (including inside a UTF-8
/// sequence); only complete lines are interpreted. An unterminated line
/// longer than the configured limit is an error.
#[derive(Debug)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    max_line: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_LEN)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            event: None,
            data: Vec::new(),
            max_line,
        }
    }

    /// Feeds a body chunk and returns every frame completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseFrame>, LineTooLong> {
        self.pending.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        if self.pending.len() > self.max_line {
            self.pending.clear();
            return Err(LineTooLong {
                limit: self.max_line,
            });
        }
        Ok(frames)
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id / retry carry no meaning for progress streams.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".into()),
            data,
        })
    }
}

/// Typed progress-stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Server-side processing progress in percent.
    Progress { progress: f64 },
    /// Terminal: the upload finished.
    Complete,
    /// Terminal: the server reported a failure.
    Error { message: Option<String> },
}

impl ProgressEvent {
    /// Returns `true` for events after which the stream must be closed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error { .. })
    }

    /// Maps a frame onto a progress event.
    ///
    /// Returns `Ok(None)` for event types this stream does not define.
    pub fn from_frame(frame: &SseFrame) -> Result<Option<Self>, serde_json::Error> {
        #[derive(Deserialize)]
        struct ProgressData {
            progress: f64,
        }

        #[derive(Deserialize)]
        struct ErrorData {
            message: Option<String>,
        }

        let event = match frame.event.as_str() {
            "progress" => {
                let data: ProgressData = serde_json::from_str(&frame.data)?;
                Self::Progress {
                    progress: data.progress,
                }
            }
            "complete" => Self::Complete,
            "error" => {
                let message = serde_json::from_str::<ErrorData>(&frame.data)
                    .ok()
                    .and_then(|d| d.message)
                    .or_else(|| {
                        let raw = frame.data.trim();
                        (!raw.is_empty()).then(|| raw.to_string())
                    });
                Self::Error { message }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}
