//! Chunked upload driver.
//!
//! Sends a file through an upload session strictly in ascending chunk
//! order, then finalizes. Nothing is retried: the first failing chunk ends
//! the upload and leaves the session for [`ChunkedUploader::resume`].

use std::sync::Arc;

use complaintkit_protocol::{AttachmentInfo, CreateSessionRequest};
use complaintkit_transfer::{
    ChunkPlan, EvidenceFile, ProgressCallback, TransferError, UploadTracker, notify_progress,
    percent_complete,
};
use tracing::{debug, info};

use crate::backend::ComplaintBackend;
use crate::error::SubmitError;

/// Drives one file through an upload session.
pub struct ChunkedUploader<'a> {
    backend: &'a dyn ComplaintBackend,
    chunk_size: u64,
    progress: Option<ProgressCallback>,
    tracker: Option<Arc<UploadTracker>>,
}

impl<'a> ChunkedUploader<'a> {
    /// `chunk_size` 0 selects the default chunk size.
    pub fn new(backend: &'a dyn ComplaintBackend, chunk_size: u64) -> Self {
        Self {
            backend,
            chunk_size,
            progress: None,
            tracker: None,
        }
    }

    /// Called with the acknowledged share after every chunk.
    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Records state transitions on `tracker` instead of a private one.
    pub fn with_tracker(mut self, tracker: Arc<UploadTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Creates a session for `file` on `complaint_id`, sends every chunk and
    /// finalizes.
    pub async fn upload(
        &self,
        complaint_id: &str,
        file: &EvidenceFile,
    ) -> Result<AttachmentInfo, SubmitError> {
        let tracker = self.tracker(file);
        let plan = file.plan(self.chunk_size);
        let total = plan.total_chunks();

        let req = CreateSessionRequest {
            complaint_id: complaint_id.to_string(),
            filename: file.name().to_string(),
            file_size: file.size(),
            mime_type: file.mime_type().to_string(),
            total_chunks: total,
        };
        let session = match self.backend.create_session(&req).await {
            Ok(s) => s,
            Err(source) => {
                tracker.fail(&source.to_string());
                return Err(SubmitError::SessionCreation {
                    filename: file.name().to_string(),
                    source,
                });
            }
        };
        let session_id = session.session_id;
        debug!(file = file.name(), session = %session_id, total, "upload session created");
        tracker.attach_session(&session_id, total, 0);

        self.send_chunks(&session_id, file, &plan, (0..total).collect(), 0, &tracker)
            .await?;
        self.finalize(&session_id, &tracker).await
    }

    /// Continues an interrupted session with the original file.
    ///
    /// The server decides what is left: its `missingChunks` list when it
    /// reports one, otherwise everything from `uploadedChunks` on. A session
    /// whose chunk count differs from the local plan is refused before any
    /// chunk is sent.
    pub async fn resume(
        &self,
        session_id: &str,
        file: &EvidenceFile,
    ) -> Result<AttachmentInfo, SubmitError> {
        let tracker = self.tracker(file);
        let status = match self.backend.session_status(session_id).await {
            Ok(s) => s,
            Err(source) => {
                tracker.fail(&source.to_string());
                return Err(SubmitError::Fetch {
                    target: format!("upload session {session_id}"),
                    source,
                });
            }
        };

        let plan = file.plan(self.chunk_size);
        let total = plan.total_chunks();
        if status.total_chunks != total {
            tracker.fail("chunk plan mismatch");
            return Err(SubmitError::PlanMismatch {
                session_id: session_id.to_string(),
                local: total,
                remote: status.total_chunks,
            });
        }

        let pending: Vec<u32> = match status.missing_chunks {
            Some(mut missing) => {
                missing.retain(|&i| i < total);
                missing.sort_unstable();
                missing.dedup();
                missing
            }
            None => (status.uploaded_chunks.min(total)..total).collect(),
        };
        let acknowledged = total - pending.len() as u32;
        info!(
            file = file.name(),
            session = session_id,
            acknowledged,
            total,
            "resuming upload"
        );
        tracker.attach_session(session_id, total, acknowledged);

        self.send_chunks(session_id, file, &plan, pending, acknowledged, &tracker)
            .await?;
        self.finalize(session_id, &tracker).await
    }

    fn tracker(&self, file: &EvidenceFile) -> Arc<UploadTracker> {
        self.tracker
            .clone()
            .unwrap_or_else(|| Arc::new(UploadTracker::new(file.name())))
    }

    async fn send_chunks(
        &self,
        session_id: &str,
        file: &EvidenceFile,
        plan: &ChunkPlan,
        indices: Vec<u32>,
        mut acknowledged: u32,
        tracker: &UploadTracker,
    ) -> Result<(), SubmitError> {
        let total = plan.total_chunks();

        for index in indices {
            tracker.begin_chunk(index);

            let bytes = match plan.range(index) {
                Some(range) => file.read_range(range).await,
                None => Err(TransferError::ChunkOutOfRange { index, total }),
            };
            let bytes = match bytes {
                Ok(b) => b,
                Err(source) => {
                    tracker.fail(&source.to_string());
                    return Err(SubmitError::Transfer {
                        filename: file.name().to_string(),
                        source,
                    });
                }
            };

            if let Err(source) = self
                .backend
                .upload_chunk(session_id, bytes, index, total)
                .await
            {
                tracker.fail(&source.to_string());
                return Err(SubmitError::ChunkUpload {
                    session_id: session_id.to_string(),
                    index,
                    total,
                    source,
                });
            }

            tracker.chunk_acknowledged();
            acknowledged += 1;
            notify_progress(self.progress.as_ref(), percent_complete(acknowledged, total));
        }
        Ok(())
    }

    async fn finalize(
        &self,
        session_id: &str,
        tracker: &UploadTracker,
    ) -> Result<AttachmentInfo, SubmitError> {
        tracker.finalizing();
        match self.backend.finalize(session_id).await {
            Ok(info) => {
                tracker.done();
                info!(
                    file = %info.filename,
                    session = session_id,
                    size = info.size,
                    elapsed_ms = tracker.elapsed().as_millis() as u64,
                    "chunked upload complete"
                );
                Ok(info)
            }
            Err(source) => {
                tracker.fail(&source.to_string());
                Err(SubmitError::Finalize {
                    session_id: session_id.to_string(),
                    source,
                })
            }
        }
    }
}
