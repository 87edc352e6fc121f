//! Client-side building blocks for evidence uploads.
//!
//! - [`validation`]: batch pre-flight against the attachment policy
//! - [`chunked`]: chunk planning and ranged file reads
//! - [`types`]: evidence file sources and per-upload state tracking
//! - [`progress`]: best-effort progress callbacks

pub mod chunked;
pub mod progress;
pub mod types;
pub mod validation;

pub use chunked::{ChunkPlan, ChunkRange, ChunkReader};
pub use progress::{ProgressCallback, notify_progress, percent_complete};
pub use types::{EvidenceFile, FileBody, UploadSnapshot, UploadState, UploadTracker};
pub use validation::{
    BatchUsage, Candidate, FileCandidate, FileValidator, Rejection, ValidationPolicy,
    ValidationReport,
};

/// Default chunk size, re-exported from the wire contract.
pub const DEFAULT_CHUNK_SIZE: u64 = complaintkit_protocol::CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk {index} out of range (file has {total} chunks)")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
