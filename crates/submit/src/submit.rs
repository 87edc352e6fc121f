//! Complaint submission orchestrator.
//!
//! Validates a complaint and its evidence, creates the complaint, uploads
//! every attachment concurrently and re-fetches the result. Individual
//! upload failures do not cancel the others.

use std::sync::Arc;

use complaintkit_client::{ProgressHandlers, ProgressSubscription};
use complaintkit_protocol::{AttachmentInfo, ComplaintRecord, ComplaintSubmission};
use complaintkit_transfer::{
    BatchUsage, DEFAULT_CHUNK_SIZE, EvidenceFile, FileCandidate, FileValidator, ProgressCallback,
};
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};

use crate::backend::ComplaintBackend;
use crate::chunked::ChunkedUploader;
use crate::error::SubmitError;
use crate::single::upload_single;
use crate::types::{FileFailure, FileRejection, SubmissionReport, SubmitConfig, SubmitEvent};

/// Rejects a complaint without any text before anything is sent.
pub fn validate_submission(submission: &ComplaintSubmission) -> Result<(), SubmitError> {
    if submission.text.trim().is_empty() {
        return Err(SubmitError::EmptyComplaint);
    }
    Ok(())
}

/// Submits complaints and manages their evidence uploads.
pub struct Submitter {
    backend: Arc<dyn ComplaintBackend>,
    config: SubmitConfig,
    validator: FileValidator,
    events_tx: Option<mpsc::Sender<SubmitEvent>>,
}

impl Submitter {
    pub fn new(backend: Arc<dyn ComplaintBackend>) -> Self {
        Self::with_config(backend, SubmitConfig::default())
    }

    pub fn with_config(backend: Arc<dyn ComplaintBackend>, mut config: SubmitConfig) -> Self {
        if config.chunk_size == 0 {
            config.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        Self {
            backend,
            validator: FileValidator::new(config.policy.clone()),
            config,
            events_tx: None,
        }
    }

    pub fn config(&self) -> &SubmitConfig {
        &self.config
    }

    /// Takes the event receiver. Can only be called once; events are only
    /// produced after it has been taken.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SubmitEvent>> {
        if self.events_tx.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        self.events_tx = Some(tx);
        Some(rx)
    }

    /// Runs the pre-flight checks: complaint text and every file against
    /// the attachment policy, as one batch.
    pub fn validate(
        &self,
        submission: &ComplaintSubmission,
        files: &[EvidenceFile],
    ) -> Result<(), SubmitError> {
        validate_submission(submission)?;
        self.check_files(files, BatchUsage::default())
    }

    fn check_files(&self, files: &[EvidenceFile], existing: BatchUsage) -> Result<(), SubmitError> {
        let candidates = files
            .iter()
            .map(|f| FileCandidate::new(f.name(), f.size(), f.mime_type()))
            .collect();
        let report = self.validator.validate(candidates, existing);
        if report.is_clean() {
            return Ok(());
        }
        let rejections = report
            .invalid
            .into_iter()
            .map(|(f, reason)| FileRejection {
                filename: f.name,
                size: f.size,
                reason,
            })
            .collect();
        Err(SubmitError::Validation(rejections))
    }

    /// Submits a complaint with all its evidence.
    ///
    /// All-or-nothing from the caller's view: if any attachment fails, the
    /// first failure in input order is returned. Attachments that did
    /// upload stay on the server.
    pub async fn submit_complaint(
        &self,
        submission: &ComplaintSubmission,
        files: Vec<EvidenceFile>,
    ) -> Result<ComplaintRecord, SubmitError> {
        let (created, results) = self.create_and_upload(submission, &files).await?;

        if let Some(err) = results.into_iter().find_map(Result::err) {
            return Err(err);
        }
        self.fetch_complaint(&created.id).await
    }

    /// Like [`submit_complaint`](Self::submit_complaint) but reports each
    /// attachment individually instead of failing as a whole.
    pub async fn submit_complaint_with_report(
        &self,
        submission: &ComplaintSubmission,
        files: Vec<EvidenceFile>,
    ) -> Result<SubmissionReport, SubmitError> {
        let (created, results) = self.create_and_upload(submission, &files).await?;

        let mut uploaded = Vec::new();
        let mut failed = Vec::new();
        for (file, result) in files.iter().zip(results) {
            match result {
                Ok(info) => uploaded.push(info),
                Err(error) => failed.push(FileFailure {
                    filename: file.name().to_string(),
                    error,
                }),
            }
        }

        let complaint = self.fetch_complaint(&created.id).await?;
        Ok(SubmissionReport {
            complaint,
            uploaded,
            failed,
        })
    }

    async fn create_and_upload(
        &self,
        submission: &ComplaintSubmission,
        files: &[EvidenceFile],
    ) -> Result<(ComplaintRecord, Vec<Result<AttachmentInfo, SubmitError>>), SubmitError> {
        self.validate(submission, files)?;

        let created = self
            .backend
            .create_complaint(submission)
            .await
            .map_err(SubmitError::ComplaintCreation)?;
        info!(complaint = %created.id, files = files.len(), "complaint created");

        let results = join_all(files.iter().map(|f| self.upload_file(&created.id, f))).await;
        Ok((created, results))
    }

    /// Attaches one more file to an existing complaint.
    ///
    /// The file is validated on its own; batch limits across earlier
    /// attachments are enforced by the server.
    pub async fn upload_attachment(
        &self,
        complaint_id: &str,
        file: &EvidenceFile,
    ) -> Result<AttachmentInfo, SubmitError> {
        self.check_files(std::slice::from_ref(file), BatchUsage::default())?;
        self.upload_file(complaint_id, file).await
    }

    /// Continues an interrupted chunked upload with the original file.
    pub async fn resume_upload(
        &self,
        session_id: &str,
        file: &EvidenceFile,
    ) -> Result<AttachmentInfo, SubmitError> {
        let filename = file.name().to_string();
        let result = ChunkedUploader::new(self.backend.as_ref(), self.config.chunk_size)
            .with_progress(self.progress_callback(&filename))
            .resume(session_id, file)
            .await;
        self.report_outcome(&filename, &result);
        result
    }

    pub async fn get_complaint(&self, complaint_id: &str) -> Result<ComplaintRecord, SubmitError> {
        self.fetch_complaint(complaint_id).await
    }

    pub async fn delete_attachment(
        &self,
        complaint_id: &str,
        attachment_id: &str,
    ) -> Result<(), SubmitError> {
        self.backend
            .delete_attachment(complaint_id, attachment_id)
            .await
            .map_err(|source| SubmitError::Delete {
                attachment_id: attachment_id.to_string(),
                source,
            })?;
        info!(complaint = complaint_id, attachment = attachment_id, "attachment deleted");
        Ok(())
    }

    /// Opens the server-push progress stream of an upload session.
    pub async fn subscribe_progress(
        &self,
        session_id: &str,
        handlers: ProgressHandlers,
    ) -> Result<ProgressSubscription, SubmitError> {
        self.backend
            .subscribe_progress(session_id, handlers)
            .await
            .map_err(|source| SubmitError::Stream {
                session_id: session_id.to_string(),
                source,
            })
    }

    async fn fetch_complaint(&self, complaint_id: &str) -> Result<ComplaintRecord, SubmitError> {
        self.backend
            .get_complaint(complaint_id)
            .await
            .map_err(|source| SubmitError::Fetch {
                target: format!("complaint {complaint_id}"),
                source,
            })
    }

    async fn upload_file(
        &self,
        complaint_id: &str,
        file: &EvidenceFile,
    ) -> Result<AttachmentInfo, SubmitError> {
        let filename = file.name().to_string();
        let progress = self.progress_callback(&filename);

        let result = if file.size() <= self.config.chunk_size {
            upload_single(self.backend.as_ref(), complaint_id, file, progress.as_ref()).await
        } else {
            ChunkedUploader::new(self.backend.as_ref(), self.config.chunk_size)
                .with_progress(progress)
                .upload(complaint_id, file)
                .await
        };
        self.report_outcome(&filename, &result);
        result
    }

    fn report_outcome(&self, filename: &str, result: &Result<AttachmentInfo, SubmitError>) {
        match result {
            Ok(info) => self.emit(SubmitEvent::AttachmentUploaded {
                filename: filename.to_string(),
                attachment: info.clone(),
            }),
            Err(e) => {
                error!(file = filename, error = %e, "attachment failed");
                self.emit(SubmitEvent::AttachmentFailed {
                    filename: filename.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Forwards per-file progress to the event channel, if anyone listens.
    fn progress_callback(&self, filename: &str) -> Option<ProgressCallback> {
        let tx = self.events_tx.clone()?;
        let filename = filename.to_string();
        Some(Arc::new(move |percent| {
            send_event(
                &tx,
                SubmitEvent::Progress {
                    filename: filename.clone(),
                    percent,
                },
            );
        }))
    }

    fn emit(&self, event: SubmitEvent) {
        if let Some(tx) = &self.events_tx {
            send_event(tx, event);
        }
    }
}

fn send_event(tx: &mpsc::Sender<SubmitEvent>, event: SubmitEvent) {
    if let Err(TrySendError::Full(_)) = tx.try_send(event) {
        warn!("event channel full, dropping event");
    }
}
