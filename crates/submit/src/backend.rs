//! Remote seam of the submission flow.
//!
//! `ComplaintBackend` is implemented by the HTTP [`Client`]; the upload
//! driver and orchestrator only see the trait, which keeps them testable
//! against an in-memory server.

use std::future::Future;
use std::pin::Pin;

use complaintkit_client::{Client, Error, ProgressHandlers, ProgressSubscription};
use complaintkit_protocol::{
    AttachmentInfo, ComplaintRecord, ComplaintSubmission, CreateSessionRequest, SessionStatus,
    UploadSession,
};

/// Boxed future returned by every backend call.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Remote operations of the complaint API.
///
/// Implementations report every non-success outcome as an error and never
/// retry.
pub trait ComplaintBackend: Send + Sync {
    fn create_complaint<'a>(
        &'a self,
        submission: &'a ComplaintSubmission,
    ) -> BackendFuture<'a, ComplaintRecord>;

    fn get_complaint<'a>(&'a self, complaint_id: &'a str) -> BackendFuture<'a, ComplaintRecord>;

    /// Single-shot attachment upload.
    fn upload_attachment<'a>(
        &'a self,
        complaint_id: &'a str,
        filename: &'a str,
        mime_type: &'a str,
        data: Vec<u8>,
    ) -> BackendFuture<'a, AttachmentInfo>;

    fn delete_attachment<'a>(
        &'a self,
        complaint_id: &'a str,
        attachment_id: &'a str,
    ) -> BackendFuture<'a, ()>;

    fn create_session<'a>(&'a self, req: &'a CreateSessionRequest)
    -> BackendFuture<'a, UploadSession>;

    fn upload_chunk<'a>(
        &'a self,
        session_id: &'a str,
        chunk: Vec<u8>,
        index: u32,
        total: u32,
    ) -> BackendFuture<'a, ()>;

    fn finalize<'a>(&'a self, session_id: &'a str) -> BackendFuture<'a, AttachmentInfo>;

    fn session_status<'a>(&'a self, session_id: &'a str) -> BackendFuture<'a, SessionStatus>;

    fn subscribe_progress<'a>(
        &'a self,
        session_id: &'a str,
        handlers: ProgressHandlers,
    ) -> BackendFuture<'a, ProgressSubscription>;
}

impl ComplaintBackend for Client {
    fn create_complaint<'a>(
        &'a self,
        submission: &'a ComplaintSubmission,
    ) -> BackendFuture<'a, ComplaintRecord> {
        Box::pin(Client::create_complaint(self, submission))
    }

    fn get_complaint<'a>(&'a self, complaint_id: &'a str) -> BackendFuture<'a, ComplaintRecord> {
        Box::pin(Client::get_complaint(self, complaint_id))
    }

    fn upload_attachment<'a>(
        &'a self,
        complaint_id: &'a str,
        filename: &'a str,
        mime_type: &'a str,
        data: Vec<u8>,
    ) -> BackendFuture<'a, AttachmentInfo> {
        Box::pin(Client::upload_attachment(
            self,
            complaint_id,
            filename,
            mime_type,
            data,
        ))
    }

    fn delete_attachment<'a>(
        &'a self,
        complaint_id: &'a str,
        attachment_id: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(Client::delete_attachment(self, complaint_id, attachment_id))
    }

    fn create_session<'a>(
        &'a self,
        req: &'a CreateSessionRequest,
    ) -> BackendFuture<'a, UploadSession> {
        Box::pin(Client::create_session(self, req))
    }

    fn upload_chunk<'a>(
        &'a self,
        session_id: &'a str,
        chunk: Vec<u8>,
        index: u32,
        total: u32,
    ) -> BackendFuture<'a, ()> {
        Box::pin(Client::upload_chunk(self, session_id, chunk, index, total))
    }

    fn finalize<'a>(&'a self, session_id: &'a str) -> BackendFuture<'a, AttachmentInfo> {
        Box::pin(Client::finalize(self, session_id))
    }

    fn session_status<'a>(&'a self, session_id: &'a str) -> BackendFuture<'a, SessionStatus> {
        Box::pin(Client::session_status(self, session_id))
    }

    fn subscribe_progress<'a>(
        &'a self,
        session_id: &'a str,
        handlers: ProgressHandlers,
    ) -> BackendFuture<'a, ProgressSubscription> {
        Box::pin(Client::subscribe_progress(self, session_id, handlers))
    }
}
