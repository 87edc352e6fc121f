//! Submission error types.

use complaintkit_client::Error as ClientError;
use complaintkit_transfer::TransferError;

use crate::types::FileRejection;

/// Errors produced while submitting a complaint or uploading evidence.
///
/// Remote failures keep the client error as their source.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{}", describe_rejections(.0))]
    Validation(Vec<FileRejection>),

    #[error("complaint text is empty")]
    EmptyComplaint,

    #[error("failed to create complaint")]
    ComplaintCreation(#[source] ClientError),

    #[error("failed to create upload session for {filename}")]
    SessionCreation {
        filename: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to upload chunk {}/{total} of session {session_id}", .index + 1)]
    ChunkUpload {
        session_id: String,
        index: u32,
        total: u32,
        #[source]
        source: ClientError,
    },

    #[error("failed to finalize upload session {session_id}")]
    Finalize {
        session_id: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to upload {filename}")]
    Upload {
        filename: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to fetch {target}")]
    Fetch {
        target: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to delete attachment {attachment_id}")]
    Delete {
        attachment_id: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to open progress stream for session {session_id}")]
    Stream {
        session_id: String,
        #[source]
        source: ClientError,
    },

    #[error("session {session_id} expects {remote} chunks, local file plans {local}")]
    PlanMismatch {
        session_id: String,
        local: u32,
        remote: u32,
    },

    #[error("failed to read {filename}")]
    Transfer {
        filename: String,
        #[source]
        source: TransferError,
    },
}

impl SubmitError {
    /// `true` when the server kept a session that [`resume_upload`] can
    /// continue.
    ///
    /// [`resume_upload`]: crate::Submitter::resume_upload
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::ChunkUpload { .. } | Self::Finalize { .. })
    }

    /// Upload session involved in the failure, if one existed.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::ChunkUpload { session_id, .. }
            | Self::Finalize { session_id, .. }
            | Self::Stream { session_id, .. }
            | Self::PlanMismatch { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

fn describe_rejections(rejections: &[FileRejection]) -> String {
    let details: Vec<String> = rejections
        .iter()
        .map(|r| format!("{}: {}", r.filename, r.reason))
        .collect();
    format!("{} file(s) rejected ({})", rejections.len(), details.join("; "))
}
