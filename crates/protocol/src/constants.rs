/// Size of one upload chunk (5 MiB).
///
/// Files at or below this size go through the single-request path; larger
/// files are split into `ceil(size / CHUNK_SIZE)` chunks.
pub const CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Per-file ceiling (100 MiB).
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Ceiling for the sum of all accepted files in one submission (500 MiB).
pub const MAX_BATCH_SIZE: u64 = 500 * 1024 * 1024;

/// Maximum number of attachments in one submission.
pub const MAX_FILES: usize = 20;

/// Extensions accepted as evidence, lower-case, without the dot.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "md", "txt", "log", "pdf", "docx", "xls", "csv", "jpg", "png", "mp3", "wav",
];

/// MIME types accepted when strict MIME checking is enabled.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "text/markdown",
    "text/plain",
    "text/x-log",
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/csv",
    "image/jpeg",
    "image/png",
    "audio/mpeg",
    "audio/wav",
    "audio/x-wav",
];

/// Fallback MIME type for files whose extension is unknown.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Returns the MIME type conventionally declared for an allow-listed
/// extension. Matching is case-insensitive.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "md" => "text/markdown",
        "txt" => "text/plain",
        "log" => "text/x-log",
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "csv" => "text/csv",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => return None,
    };
    Some(mime)
}
