//! Complaint submission flow: validate, create, upload evidence, resume.
//!
//! The flow only talks to the server through [`ComplaintBackend`], which the
//! HTTP client implements.
//!
//! # Pipeline
//!
//! 1. **Validate**: complaint text and every file against the attachment policy
//! 2. **Create**: the complaint record
//! 3. **Upload**: every file concurrently, single-shot or chunked by size
//! 4. **Fetch**: the complaint again, now listing its attachments

pub mod backend;
pub mod chunked;
pub mod error;
pub mod single;
pub mod submit;
pub mod types;

#[cfg(test)]
mod testing;

pub use backend::{BackendFuture, ComplaintBackend};
pub use chunked::ChunkedUploader;
pub use error::SubmitError;
pub use single::upload_single;
pub use submit::{Submitter, validate_submission};
pub use types::{FileFailure, FileRejection, SubmissionReport, SubmitConfig, SubmitEvent};
