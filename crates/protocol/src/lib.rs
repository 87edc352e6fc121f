//! Wire types for the complaint API.
//!
//! Everything here is shared between the HTTP client, the upload driver and
//! the command-line front end: JSON payloads, the fixed upload contract and
//! the server-push progress event format.

pub mod constants;
pub mod events;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{CHUNK_SIZE, MAX_BATCH_SIZE, MAX_FILE_SIZE, MAX_FILES};
pub use events::{LineTooLong, ProgressEvent, SseDecoder, SseFrame};
pub use types::{
    AttachmentInfo, ComplaintRecord, ComplaintStatus, ComplaintSubmission,
    CreateSessionRequest, Priority, ScanStatus, SessionStatus, UploadSession,
};
