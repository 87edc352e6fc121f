//! In-memory complaint server for driver and orchestrator tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use complaintkit_client::{Error, ProgressHandlers, ProgressSubscription};
use complaintkit_protocol::{
    AttachmentInfo, ComplaintRecord, ComplaintStatus, ComplaintSubmission, CreateSessionRequest,
    ScanStatus, SessionStatus, UploadSession,
};

use crate::backend::{BackendFuture, ComplaintBackend};

struct Session {
    request: CreateSessionRequest,
    received: BTreeMap<u32, Vec<u8>>,
}

#[derive(Default)]
struct State {
    complaints: HashMap<String, Vec<AttachmentInfo>>,
    sessions: HashMap<String, Session>,
    /// Assembled bytes of every attachment, by attachment id.
    contents: HashMap<String, Vec<u8>>,
    next_id: u32,
}

/// Records every call as a short line (`"chunk s1 0/3"`) and behaves like
/// the real server: chunks are stored per session and finalize only
/// succeeds once every index arrived.
#[derive(Default)]
pub(crate) struct MockBackend {
    state: Mutex<State>,
    calls: Mutex<Vec<String>>,
    pub fail_complaint: Mutex<bool>,
    pub fail_fetch: Mutex<bool>,
    /// Filenames whose upload (single-shot or session creation) fails.
    pub fail_files: Mutex<HashSet<String>>,
    /// Chunk index that fails once, in any session.
    pub fail_chunk_once: Mutex<Option<u32>>,
    pub fail_finalize_once: Mutex<bool>,
    /// Report `missingChunks` in session status.
    pub report_missing: Mutex<bool>,
    /// Overrides `totalChunks` in session status.
    pub status_total_override: Mutex<Option<u32>>,
    /// Raw event-stream body served by `subscribe_progress`.
    pub progress_body: Mutex<String>,
}

fn unavailable() -> Error {
    Error::Api {
        status: 503,
        body: "unavailable".into(),
    }
}

fn timestamp() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls that sent a chunk, as `(session, index)`.
    pub(crate) fn chunk_calls(&self) -> Vec<(String, u32)> {
        self.calls()
            .iter()
            .filter_map(|c| {
                let mut parts = c.split(' ');
                (parts.next() == Some("chunk")).then_some(())?;
                let session = parts.next()?.to_string();
                let index = parts.next()?.split('/').next()?.parse().ok()?;
                Some((session, index))
            })
            .collect()
    }

    /// Bytes the server assembled for an attachment.
    pub(crate) fn content(&self, attachment_id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .contents
            .get(attachment_id)
            .cloned()
    }

    pub(crate) fn attachments(&self, complaint_id: &str) -> Vec<AttachmentInfo> {
        self.state
            .lock()
            .unwrap()
            .complaints
            .get(complaint_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("{prefix}{}", state.next_id)
    }

    fn store_attachment(&self, complaint_id: &str, filename: &str, mime_type: &str, data: Vec<u8>) -> AttachmentInfo {
        let info = AttachmentInfo {
            id: self.next_id("a"),
            filename: filename.to_string(),
            size: data.len() as u64,
            mime_type: mime_type.to_string(),
            uploaded_at: timestamp(),
            scan_status: ScanStatus::Pending,
        };
        let mut state = self.state.lock().unwrap();
        state
            .complaints
            .entry(complaint_id.to_string())
            .or_default()
            .push(info.clone());
        state.contents.insert(info.id.clone(), data);
        info
    }

    fn do_create_complaint(&self, submission: &ComplaintSubmission) -> Result<ComplaintRecord, Error> {
        self.record(format!("create_complaint {}", submission.text));
        if *self.fail_complaint.lock().unwrap() {
            return Err(unavailable());
        }
        let id = self.next_id("c");
        self.state
            .lock()
            .unwrap()
            .complaints
            .insert(id.clone(), Vec::new());
        Ok(ComplaintRecord {
            id,
            status: ComplaintStatus::Pending,
            created_at: timestamp(),
            attachments: Vec::new(),
        })
    }

    fn do_get_complaint(&self, complaint_id: &str) -> Result<ComplaintRecord, Error> {
        self.record(format!("get_complaint {complaint_id}"));
        if *self.fail_fetch.lock().unwrap() {
            return Err(unavailable());
        }
        let state = self.state.lock().unwrap();
        let attachments = state.complaints.get(complaint_id).cloned().ok_or(Error::Api {
            status: 404,
            body: "not found".into(),
        })?;
        Ok(ComplaintRecord {
            id: complaint_id.to_string(),
            status: ComplaintStatus::Pending,
            created_at: timestamp(),
            attachments,
        })
    }

    fn do_upload_attachment(
        &self,
        complaint_id: &str,
        filename: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<AttachmentInfo, Error> {
        self.record(format!("upload_attachment {filename}"));
        if self.fail_files.lock().unwrap().contains(filename) {
            return Err(unavailable());
        }
        Ok(self.store_attachment(complaint_id, filename, mime_type, data))
    }

    fn do_delete_attachment(&self, complaint_id: &str, attachment_id: &str) -> Result<(), Error> {
        self.record(format!("delete_attachment {complaint_id} {attachment_id}"));
        let mut state = self.state.lock().unwrap();
        let list = state.complaints.get_mut(complaint_id).ok_or(Error::Api {
            status: 404,
            body: "not found".into(),
        })?;
        let before = list.len();
        list.retain(|a| a.id != attachment_id);
        if list.len() == before {
            return Err(Error::Api {
                status: 404,
                body: "not found".into(),
            });
        }
        Ok(())
    }

    fn do_create_session(&self, req: &CreateSessionRequest) -> Result<UploadSession, Error> {
        self.record(format!("create_session {} {}", req.filename, req.total_chunks));
        if self.fail_files.lock().unwrap().contains(&req.filename) {
            return Err(unavailable());
        }
        let session_id = self.next_id("s");
        self.state.lock().unwrap().sessions.insert(
            session_id.clone(),
            Session {
                request: req.clone(),
                received: BTreeMap::new(),
            },
        );
        Ok(UploadSession {
            upload_url: format!("/upload-sessions/{session_id}"),
            session_id,
            expires_at: timestamp(),
        })
    }

    fn do_upload_chunk(&self, session_id: &str, chunk: Vec<u8>, index: u32, total: u32) -> Result<(), Error> {
        self.record(format!("chunk {session_id} {index}/{total}"));
        {
            let mut fail = self.fail_chunk_once.lock().unwrap();
            if *fail == Some(index) {
                *fail = None;
                return Err(unavailable());
            }
        }
        let mut state = self.state.lock().unwrap();
        let session = state.sessions.get_mut(session_id).ok_or(Error::Api {
            status: 404,
            body: "unknown session".into(),
        })?;
        session.received.insert(index, chunk);
        Ok(())
    }

    /// Stores a chunk directly, as if an earlier process had sent it.
    pub(crate) fn preload_chunk(&self, session_id: &str, index: u32, chunk: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.received.insert(index, chunk);
        }
    }

    fn do_finalize(&self, session_id: &str) -> Result<AttachmentInfo, Error> {
        self.record(format!("finalize {session_id}"));
        {
            let mut fail = self.fail_finalize_once.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(unavailable());
            }
        }
        let (request, data) = {
            let state = self.state.lock().unwrap();
            let session = state.sessions.get(session_id).ok_or(Error::Api {
                status: 404,
                body: "unknown session".into(),
            })?;
            let total = session.request.total_chunks;
            if (0..total).any(|i| !session.received.contains_key(&i)) {
                return Err(Error::Api {
                    status: 409,
                    body: "missing chunks".into(),
                });
            }
            let data: Vec<u8> = session.received.values().flatten().copied().collect();
            (session.request.clone(), data)
        };
        self.state.lock().unwrap().sessions.remove(session_id);
        Ok(self.store_attachment(&request.complaint_id, &request.filename, &request.mime_type, data))
    }

    fn do_session_status(&self, session_id: &str) -> Result<SessionStatus, Error> {
        self.record(format!("session_status {session_id}"));
        let state = self.state.lock().unwrap();
        let session = state.sessions.get(session_id).ok_or(Error::Api {
            status: 404,
            body: "unknown session".into(),
        })?;
        let total = session.request.total_chunks;
        let missing: Vec<u32> = (0..total)
            .filter(|i| !session.received.contains_key(i))
            .collect();
        Ok(SessionStatus {
            uploaded_chunks: session.received.len() as u32,
            total_chunks: self.status_total_override.lock().unwrap().unwrap_or(total),
            missing_chunks: self.report_missing.lock().unwrap().then_some(missing),
        })
    }
}

impl ComplaintBackend for MockBackend {
    fn create_complaint<'a>(
        &'a self,
        submission: &'a ComplaintSubmission,
    ) -> BackendFuture<'a, ComplaintRecord> {
        Box::pin(async move { self.do_create_complaint(submission) })
    }

    fn get_complaint<'a>(&'a self, complaint_id: &'a str) -> BackendFuture<'a, ComplaintRecord> {
        Box::pin(async move { self.do_get_complaint(complaint_id) })
    }

    fn upload_attachment<'a>(
        &'a self,
        complaint_id: &'a str,
        filename: &'a str,
        mime_type: &'a str,
        data: Vec<u8>,
    ) -> BackendFuture<'a, AttachmentInfo> {
        Box::pin(async move { self.do_upload_attachment(complaint_id, filename, mime_type, data) })
    }

    fn delete_attachment<'a>(
        &'a self,
        complaint_id: &'a str,
        attachment_id: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.do_delete_attachment(complaint_id, attachment_id) })
    }

    fn create_session<'a>(
        &'a self,
        req: &'a CreateSessionRequest,
    ) -> BackendFuture<'a, UploadSession> {
        Box::pin(async move { self.do_create_session(req) })
    }

    fn upload_chunk<'a>(
        &'a self,
        session_id: &'a str,
        chunk: Vec<u8>,
        index: u32,
        total: u32,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            // Let concurrently running uploads interleave.
            tokio::task::yield_now().await;
            self.do_upload_chunk(session_id, chunk, index, total)
        })
    }

    fn finalize<'a>(&'a self, session_id: &'a str) -> BackendFuture<'a, AttachmentInfo> {
        Box::pin(async move { self.do_finalize(session_id) })
    }

    fn session_status<'a>(&'a self, session_id: &'a str) -> BackendFuture<'a, SessionStatus> {
        Box::pin(async move { self.do_session_status(session_id) })
    }

    fn subscribe_progress<'a>(
        &'a self,
        session_id: &'a str,
        handlers: ProgressHandlers,
    ) -> BackendFuture<'a, ProgressSubscription> {
        Box::pin(async move {
            self.record(format!("subscribe_progress {session_id}"));
            let body = self.progress_body.lock().unwrap().clone().into_bytes();
            let stream = futures_util::stream::iter(vec![Ok::<_, Infallible>(body)]);
            Ok(ProgressSubscription::from_stream(stream, handlers))
        })
    }
}
