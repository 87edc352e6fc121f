//! Complaint API client.
//!
//! Async HTTP client using `reqwest`. Every non-2xx response is surfaced as
//! [`Error::Api`] with the status code and the raw body; nothing is retried.

use std::time::Duration;

use complaintkit_protocol::{
    AttachmentInfo, ComplaintRecord, ComplaintSubmission, CreateSessionRequest, SessionStatus,
    UploadSession,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::subscription::{ProgressHandlers, ProgressSubscription};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8787/api";

/// Unreserved characters stay literal in path segments.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Errors from the complaint API client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("progress stream error: {0}")]
    Stream(String),

    #[error("upload processing failed: {}", .message.as_deref().unwrap_or("no details"))]
    ProcessingFailed { message: Option<String> },
}

impl Error {
    /// HTTP status of an API rejection.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Complaint API client.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    /// Progress streams are long-lived and must not inherit the request
    /// timeout.
    stream_http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a client for `base_url` with no request timeout.
    pub fn new(base_url: &str) -> Result<Self, Error> {
        Self::with_timeout(base_url, None)
    }

    /// Creates a client whose requests fail after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Result<Self, Error> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| Error::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidBaseUrl(format!(
                "{base_url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            stream_http: reqwest::Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request and maps non-success statuses to [`Error::Api`].
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let resp = req.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, Error> {
        let resp = self.send(req).await?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    // -----------------------------------------------------------------------
    // Complaints
    // -----------------------------------------------------------------------

    /// Creates a complaint record.
    pub async fn create_complaint(
        &self,
        submission: &ComplaintSubmission,
    ) -> Result<ComplaintRecord, Error> {
        debug!("creating complaint");
        self.send_json(self.http.post(self.url("/complaints")).json(submission))
            .await
    }

    /// Fetches a complaint with its attachments.
    pub async fn get_complaint(&self, complaint_id: &str) -> Result<ComplaintRecord, Error> {
        let path = format!("/complaints/{}", encode(complaint_id));
        self.send_json(self.http.get(self.url(&path))).await
    }

    /// Attaches a small file in one multipart request.
    pub async fn upload_attachment(
        &self,
        complaint_id: &str,
        filename: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<AttachmentInfo, Error> {
        debug!(complaint = complaint_id, file = filename, size = data.len(), "single-shot upload");
        let mut part = Part::bytes(data).file_name(filename.to_string());
        if !mime_type.is_empty() {
            part = part.mime_str(mime_type)?;
        }
        let form = Form::new()
            .part("file", part)
            .text("complaintId", complaint_id.to_string());

        let path = format!("/complaints/{}/attachments", encode(complaint_id));
        self.send_json(self.http.post(self.url(&path)).multipart(form))
            .await
    }

    /// Removes one attachment from a complaint.
    pub async fn delete_attachment(
        &self,
        complaint_id: &str,
        attachment_id: &str,
    ) -> Result<(), Error> {
        let path = format!(
            "/complaints/{}/attachments/{}",
            encode(complaint_id),
            encode(attachment_id)
        );
        self.send(self.http.delete(self.url(&path))).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Upload sessions
    // -----------------------------------------------------------------------

    /// Opens a chunked upload session.
    pub async fn create_session(&self, req: &CreateSessionRequest) -> Result<UploadSession, Error> {
        debug!(
            complaint = %req.complaint_id,
            file = %req.filename,
            total_chunks = req.total_chunks,
            "creating upload session"
        );
        self.send_json(self.http.post(self.url("/upload-sessions")).json(req))
            .await
    }

    /// Sends chunk `index` of `total`. The acknowledgement body is ignored.
    pub async fn upload_chunk(
        &self,
        session_id: &str,
        chunk: Vec<u8>,
        index: u32,
        total: u32,
    ) -> Result<(), Error> {
        debug!(session = session_id, index, total, size = chunk.len(), "sending chunk");
        let form = Form::new()
            .part("chunk", Part::bytes(chunk).file_name("blob"))
            .text("chunkIndex", index.to_string())
            .text("totalChunks", total.to_string());

        let path = format!("/upload-sessions/{}/chunks", encode(session_id));
        self.send(self.http.post(self.url(&path)).multipart(form))
            .await?;
        Ok(())
    }

    /// Completes a session and returns the resulting attachment.
    pub async fn finalize(&self, session_id: &str) -> Result<AttachmentInfo, Error> {
        let path = format!("/upload-sessions/{}/finalize", encode(session_id));
        self.send_json(self.http.post(self.url(&path))).await
    }

    /// Asks the server how far a session got.
    pub async fn session_status(&self, session_id: &str) -> Result<SessionStatus, Error> {
        let path = format!("/upload-sessions/{}", encode(session_id));
        self.send_json(self.http.get(self.url(&path))).await
    }

    /// Opens the server-push progress stream of a session.
    ///
    /// Returns once the server accepted the stream; events are dispatched to
    /// `handlers` from a background task until a terminal event arrives or
    /// the returned subscription is closed or dropped.
    pub async fn subscribe_progress(
        &self,
        session_id: &str,
        handlers: ProgressHandlers,
    ) -> Result<ProgressSubscription, Error> {
        let path = format!("/upload-sessions/{}/progress", encode(session_id));
        let req = self
            .stream_http
            .get(self.url(&path))
            .header(ACCEPT, "text/event-stream");
        let resp = self.send(req).await?;
        debug!(session = session_id, "progress stream open");
        Ok(ProgressSubscription::from_stream(resp.bytes_stream(), handlers))
    }
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
