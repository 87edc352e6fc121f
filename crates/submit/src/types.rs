use complaintkit_protocol::{AttachmentInfo, CHUNK_SIZE, ComplaintRecord};
use complaintkit_transfer::{Rejection, ValidationPolicy};

use crate::error::SubmitError;

/// Settings for a [`Submitter`](crate::Submitter).
#[derive(Debug, Clone)]
pub struct SubmitConfig {
    /// Chunk size for large files. Files up to this size go single-shot.
    pub chunk_size: u64,
    pub policy: ValidationPolicy,
    /// Capacity of the event channel; events beyond it are dropped.
    pub event_buffer: usize,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            policy: ValidationPolicy::default(),
            event_buffer: 256,
        }
    }
}

/// A file refused by pre-flight validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRejection {
    pub filename: String,
    pub size: u64,
    pub reason: Rejection,
}

/// Events emitted during a submission.
#[derive(Debug, Clone)]
pub enum SubmitEvent {
    /// Upload progress of one file, in percent.
    Progress { filename: String, percent: f64 },
    AttachmentUploaded {
        filename: String,
        attachment: AttachmentInfo,
    },
    AttachmentFailed { filename: String, error: String },
}

/// One attachment that could not be uploaded.
#[derive(Debug)]
pub struct FileFailure {
    pub filename: String,
    pub error: SubmitError,
}

/// Outcome of a submission that tolerates individual attachment failures.
#[derive(Debug)]
pub struct SubmissionReport {
    /// The complaint as re-fetched after all uploads settled.
    pub complaint: ComplaintRecord,
    /// Attachments created by this submission, in input order.
    pub uploaded: Vec<AttachmentInfo>,
    /// Failed attachments, in input order.
    pub failed: Vec<FileFailure>,
}

impl SubmissionReport {
    /// `true` if every attachment was uploaded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failures that left a resumable session behind.
    pub fn resumable(&self) -> impl Iterator<Item = &FileFailure> {
        self.failed.iter().filter(|f| f.error.is_resumable())
    }
}
