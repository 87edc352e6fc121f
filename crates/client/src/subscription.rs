//! Progress-stream subscription.
//!
//! A [`ProgressSubscription`] owns the background task reading a session's
//! event stream. The task ends on the first terminal event, when the stream
//! ends or fails, or when the subscription is closed or dropped; in every
//! case the connection is released.

use std::fmt::Display;

use complaintkit_protocol::{ProgressEvent, SseDecoder};
use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::Error;

type ProgressFn = Box<dyn FnMut(f64) + Send>;
type CompleteFn = Box<dyn FnOnce() + Send>;
type ErrorFn = Box<dyn FnOnce(Error) + Send>;

/// Caller-supplied reactions to progress events.
///
/// At most one of `on_complete` / `on_error` runs, exactly once, unless the
/// subscription is closed first.
#[derive(Default)]
pub struct ProgressHandlers {
    on_progress: Option<ProgressFn>,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
}

impl ProgressHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with server-side progress in percent.
    pub fn on_progress(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called with [`Error::ProcessingFailed`] for a server `error` event and
    /// with [`Error::Stream`] when the stream breaks before a terminal event.
    pub fn on_error(mut self, f: impl FnOnce(Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn progress(&mut self, percent: f64) {
        if let Some(f) = self.on_progress.as_mut() {
            f(percent);
        }
    }

    fn complete(self) {
        if let Some(f) = self.on_complete {
            f();
        }
    }

    fn error(self, err: Error) {
        match self.on_error {
            Some(f) => f(err),
            None => warn!(error = %err, "progress stream failed"),
        }
    }
}

/// Handle to a running progress-stream reader.
pub struct ProgressSubscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ProgressSubscription {
    /// Starts dispatching events decoded from a raw `text/event-stream`
    /// body stream.
    pub fn from_stream<S, B, E>(stream: S, handlers: ProgressHandlers) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(read_events(stream, handlers, cancel.clone()));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stops reading and releases the connection. No handler runs after
    /// the reader observes the close.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// `true` once the reader has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the reader to stop.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "progress reader task failed");
            }
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_events<S, B, E>(stream: S, mut handlers: ProgressHandlers, cancel: CancellationToken)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("progress subscription closed");
                return;
            }
            next = stream.next() => next,
        };

        let bytes = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                handlers.error(Error::Stream(e.to_string()));
                return;
            }
            None => {
                handlers.error(Error::Stream(
                    "stream ended before a terminal event".into(),
                ));
                return;
            }
        };

        let frames = match decoder.push(bytes.as_ref()) {
            Ok(frames) => frames,
            Err(e) => {
                handlers.error(Error::Stream(e.to_string()));
                return;
            }
        };

        for frame in frames {
            match ProgressEvent::from_frame(&frame) {
                Ok(Some(ProgressEvent::Progress { progress })) => handlers.progress(progress),
                Ok(Some(ProgressEvent::Complete)) => {
                    debug!("progress stream complete");
                    handlers.complete();
                    return;
                }
                Ok(Some(ProgressEvent::Error { message })) => {
                    handlers.error(Error::ProcessingFailed { message });
                    return;
                }
                Ok(None) => trace!(event = %frame.event, "ignoring event"),
                Err(e) => warn!(event = %frame.event, error = %e, "malformed progress event"),
            }
        }
    }
}
