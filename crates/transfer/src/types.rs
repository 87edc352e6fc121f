use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use complaintkit_protocol::constants::{DEFAULT_MIME_TYPE, mime_for_extension};
use tracing::{debug, warn};

use crate::chunked::{ChunkPlan, ChunkRange, ChunkReader};
use crate::validation::{Candidate, extension_of};
use crate::TransferError;

// ---------------------------------------------------------------------------
// EvidenceFile
// ---------------------------------------------------------------------------

/// Where the bytes of an evidence file live.
#[derive(Debug, Clone)]
pub enum FileBody {
    /// A file on local disk, read range by range.
    Disk(PathBuf),
    /// Bytes already in memory.
    Memory(Arc<[u8]>),
}

/// A file selected for attachment: name, declared type and size, and a
/// handle to its contents.
#[derive(Debug, Clone)]
pub struct EvidenceFile {
    name: String,
    mime_type: String,
    size: u64,
    body: FileBody,
}

impl EvidenceFile {
    /// Wraps in-memory bytes.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            body: FileBody::Memory(data),
        }
    }

    /// Describes a file on disk. The MIME type is derived from the extension.
    ///
    /// The size is captured now; reads fail with a short read if the file
    /// shrinks afterwards.
    pub fn from_path(path: &Path) -> Result<Self, TransferError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidPath(path.display().to_string()))?
            .to_string();
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let mime_type = extension_of(&name)
            .and_then(|ext| mime_for_extension(&ext))
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        Ok(Self {
            name,
            mime_type,
            size: meta.len(),
            body: FileBody::Disk(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn body(&self) -> &FileBody {
        &self.body
    }

    /// Chunk plan for this file at `chunk_size`.
    pub fn plan(&self, chunk_size: u64) -> ChunkPlan {
        ChunkPlan::new(self.size, chunk_size)
    }

    /// Reads the bytes of one chunk.
    pub async fn read_range(&self, range: ChunkRange) -> Result<Vec<u8>, TransferError> {
        match &self.body {
            FileBody::Memory(data) => {
                let (start, end) = (range.start as usize, range.end as usize);
                data.get(start..end)
                    .map(<[u8]>::to_vec)
                    .ok_or(TransferError::ShortRead {
                        expected: range.len(),
                        actual: (data.len() as u64).saturating_sub(range.start),
                    })
            }
            FileBody::Disk(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || ChunkReader::open(&path)?.read_range(range))
                    .await
                    .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
            }
        }
    }

    /// Reads the whole file.
    pub async fn read_all(&self) -> Result<Vec<u8>, TransferError> {
        self.read_range(ChunkRange {
            index: 0,
            start: 0,
            end: self.size,
        })
        .await
    }
}

impl Candidate for EvidenceFile {
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

// ---------------------------------------------------------------------------
// UploadTracker
// ---------------------------------------------------------------------------

/// Lifecycle of one chunked upload.
///
/// `Created -> Uploading(i) -> Finalizing -> Done`; `Failed` is reachable
/// from every non-terminal state. `Failed { index: None }` means the failure
/// happened outside the chunk loop (session creation or finalize).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Created,
    Uploading { index: u32 },
    Finalizing,
    Done,
    Failed { index: Option<u32> },
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }

    fn can_become(self, next: UploadState) -> bool {
        use UploadState::*;
        match (self, next) {
            (Created, Uploading { index: _ }) | (Created, Finalizing) => true,
            (Uploading { index: a }, Uploading { index: b }) => b > a,
            (Uploading { .. }, Finalizing) => true,
            (Finalizing, Done) => true,
            (Created | Uploading { .. } | Finalizing, Failed { .. }) => true,
            _ => false,
        }
    }
}

/// Point-in-time copy of an upload's state.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSnapshot {
    pub filename: String,
    pub session_id: Option<String>,
    pub state: UploadState,
    pub total_chunks: u32,
    pub chunks_acknowledged: u32,
    pub error: Option<String>,
}

impl UploadSnapshot {
    /// Share of chunks acknowledged, in percent (0 when nothing is planned).
    pub fn percentage(&self) -> f64 {
        crate::progress::percent_complete(self.chunks_acknowledged, self.total_chunks)
    }
}

/// Tracks one upload's state machine (thread-safe).
///
/// The driver owns the transitions; callers may hold a clone of the
/// `Arc` to observe progress or to learn the session id after a failure.
pub struct UploadTracker {
    inner: RwLock<TrackerInner>,
}

struct TrackerInner {
    filename: String,
    session_id: Option<String>,
    state: UploadState,
    total_chunks: u32,
    chunks_acknowledged: u32,
    started_at: Instant,
    error: Option<String>,
}

impl UploadTracker {
    /// Creates a tracker in the `Created` state.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(TrackerInner {
                filename: filename.into(),
                session_id: None,
                state: UploadState::Created,
                total_chunks: 0,
                chunks_acknowledged: 0,
                started_at: Instant::now(),
                error: None,
            }),
        }
    }

    /// Records the server-issued session and the chunk count.
    ///
    /// `already_acknowledged` is non-zero when resuming.
    pub fn attach_session(&self, session_id: &str, total_chunks: u32, already_acknowledged: u32) {
        let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        s.session_id = Some(session_id.to_string());
        s.total_chunks = total_chunks;
        s.chunks_acknowledged = already_acknowledged.min(total_chunks);
    }

    /// Chunk `index` is about to be sent.
    pub fn begin_chunk(&self, index: u32) {
        self.transition(UploadState::Uploading { index });
    }

    /// The server acknowledged the chunk currently being sent.
    pub fn chunk_acknowledged(&self) {
        let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        s.chunks_acknowledged = (s.chunks_acknowledged + 1).min(s.total_chunks);
    }

    pub fn finalizing(&self) {
        self.transition(UploadState::Finalizing);
    }

    pub fn done(&self) {
        self.transition(UploadState::Done);
    }

    /// Marks the upload failed. The chunk index is taken from the current
    /// state when it is `Uploading`.
    pub fn fail(&self, err: &str) {
        let index = match self.state() {
            UploadState::Uploading { index } => Some(index),
            _ => None,
        };
        self.transition(UploadState::Failed { index });
        let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        s.error = Some(err.to_string());
    }

    pub fn state(&self) -> UploadState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session_id
            .clone()
    }

    /// Time since the tracker was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .started_at
            .elapsed()
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        let s = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        UploadSnapshot {
            filename: s.filename.clone(),
            session_id: s.session_id.clone(),
            state: s.state,
            total_chunks: s.total_chunks,
            chunks_acknowledged: s.chunks_acknowledged,
            error: s.error.clone(),
        }
    }

    fn transition(&self, next: UploadState) {
        let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !s.state.can_become(next) {
            warn!(file = %s.filename, from = ?s.state, to = ?next, "unexpected upload transition");
        }
        debug!(file = %s.filename, from = ?s.state, to = ?next, "upload state");
        s.state = next;
    }
}
