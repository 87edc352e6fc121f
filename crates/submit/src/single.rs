//! Single-shot upload path for files that fit in one chunk.

use complaintkit_protocol::AttachmentInfo;
use complaintkit_transfer::{EvidenceFile, ProgressCallback, notify_progress};
use tracing::info;

use crate::backend::ComplaintBackend;
use crate::error::SubmitError;

/// Uploads `file` in one multipart request. Progress reports 0 before the
/// request and 100 after it succeeds.
pub async fn upload_single(
    backend: &dyn ComplaintBackend,
    complaint_id: &str,
    file: &EvidenceFile,
    progress: Option<&ProgressCallback>,
) -> Result<AttachmentInfo, SubmitError> {
    notify_progress(progress, 0.0);

    let data = file
        .read_all()
        .await
        .map_err(|source| SubmitError::Transfer {
            filename: file.name().to_string(),
            source,
        })?;

    let info = backend
        .upload_attachment(complaint_id, file.name(), file.mime_type(), data)
        .await
        .map_err(|source| SubmitError::Upload {
            filename: file.name().to_string(),
            source,
        })?;

    notify_progress(progress, 100.0);
    info!(file = %info.filename, size = info.size, "attachment uploaded");
    Ok(info)
}
