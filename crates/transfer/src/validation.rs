//! Pre-flight attachment policy.
//!
//! Runs before any network call. Rules are evaluated in a fixed order and
//! the first failing rule decides the rejection:
//!
//! 1. extension allow-list
//! 2. declared MIME type (only with [`ValidationPolicy::strict_mime_types`])
//! 3. per-file size ceiling
//! 4. batch size ceiling
//! 5. batch file count ("slot exhausted")

use complaintkit_protocol::constants::{
    ALLOWED_EXTENSIONS, ALLOWED_MIME_TYPES, MAX_BATCH_SIZE, MAX_FILE_SIZE, MAX_FILES,
};

const MIB: u64 = 1024 * 1024;

/// Anything the validator can judge: a name, a declared size and a
/// declared MIME type.
pub trait Candidate {
    fn name(&self) -> &str;
    fn size(&self) -> u64;
    fn mime_type(&self) -> &str;
}

/// A bare file description, for callers that have no file handle yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl FileCandidate {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }
}

impl Candidate for FileCandidate {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// Why a file was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Invalid file type")]
    InvalidType { extension: Option<String> },

    #[error("MIME type {mime_type} is not allowed")]
    MimeNotAllowed { mime_type: String },

    #[error("File too large (max {}MB)", .limit / MIB)]
    TooLarge { size: u64, limit: u64 },

    #[error("Total size exceeds {}MB", .limit / MIB)]
    BatchTooLarge { total: u64, limit: u64 },

    #[error("No attachment slots left (max {limit} files)")]
    SlotExhausted { limit: usize },
}

impl Rejection {
    /// `true` when the file itself is fine but the batch has no room left.
    pub fn is_slot_exhausted(&self) -> bool {
        matches!(self, Self::SlotExhausted { .. })
    }
}

/// Limits applied by [`FileValidator`]. `Default` is the service contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub max_file_size: u64,
    pub max_batch_size: u64,
    pub max_files: usize,
    /// Also require the declared MIME type to be allow-listed. An empty
    /// declared type always passes.
    pub strict_mime_types: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
            max_files: MAX_FILES,
            strict_mime_types: false,
        }
    }
}

/// Files and bytes already accepted into a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchUsage {
    pub files: usize,
    pub bytes: u64,
}

impl BatchUsage {
    /// Usage of an already accepted set of files.
    pub fn of<F: Candidate>(accepted: &[F]) -> Self {
        Self {
            files: accepted.len(),
            bytes: accepted
                .iter()
                .fold(0u64, |acc, f| acc.saturating_add(f.size())),
        }
    }
}

/// Partition of a candidate set. Every input lands in exactly one list,
/// in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport<F> {
    pub valid: Vec<F>,
    pub invalid: Vec<(F, Rejection)>,
}

impl<F> ValidationReport<F> {
    /// `true` if nothing was rejected.
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Stateless attachment validator.
#[derive(Debug, Clone, Default)]
pub struct FileValidator {
    policy: ValidationPolicy,
}

impl FileValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Partitions `files` into accepted and rejected, given what the batch
    /// already holds. Pure: the same input always yields the same report.
    pub fn validate<F: Candidate>(&self, files: Vec<F>, existing: BatchUsage) -> ValidationReport<F> {
        let mut usage = existing;
        let mut valid = Vec::new();
        let mut invalid = Vec::new();

        for file in files {
            match self.check(&file, &usage) {
                Ok(()) => {
                    usage.files += 1;
                    usage.bytes = usage.bytes.saturating_add(file.size());
                    valid.push(file);
                }
                Err(reason) => invalid.push((file, reason)),
            }
        }

        ValidationReport { valid, invalid }
    }

    /// Judges a single file against the current batch usage.
    pub fn check<F: Candidate + ?Sized>(&self, file: &F, usage: &BatchUsage) -> Result<(), Rejection> {
        let extension = extension_of(file.name());
        match &extension {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
            _ => return Err(Rejection::InvalidType { extension }),
        }

        let mime = file.mime_type();
        if self.policy.strict_mime_types && !mime.is_empty() && !ALLOWED_MIME_TYPES.contains(&mime) {
            return Err(Rejection::MimeNotAllowed {
                mime_type: mime.to_string(),
            });
        }

        if file.size() > self.policy.max_file_size {
            return Err(Rejection::TooLarge {
                size: file.size(),
                limit: self.policy.max_file_size,
            });
        }

        let total = usage.bytes.saturating_add(file.size());
        if total > self.policy.max_batch_size {
            return Err(Rejection::BatchTooLarge {
                total,
                limit: self.policy.max_batch_size,
            });
        }

        if usage.files >= self.policy.max_files {
            return Err(Rejection::SlotExhausted {
                limit: self.policy.max_files,
            });
        }

        Ok(())
    }
}

/// Lower-cased substring after the last `.`, if any and non-empty.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}
