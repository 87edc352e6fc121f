use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Half-open byte range `[start, end)` of chunk `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u32,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    /// Number of bytes in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Fixed-size partition of a file into chunks.
///
/// `total_chunks = ceil(file_size / chunk_size)`; every chunk but the last
/// is exactly `chunk_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    total_chunks: u32,
}

impl ChunkPlan {
    /// Plans `file_size` bytes in chunks of `chunk_size`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (5 MiB) is used.
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let total = file_size.div_ceil(chunk_size);
        Self {
            file_size,
            chunk_size,
            total_chunks: u32::try_from(total).unwrap_or(u32::MAX),
        }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Returns the range of chunk `index`, or `None` past the end.
    pub fn range(&self, index: u32) -> Option<ChunkRange> {
        if index >= self.total_chunks {
            return None;
        }
        let start = u64::from(index) * self.chunk_size;
        let end = (start + self.chunk_size).min(self.file_size);
        Some(ChunkRange { index, start, end })
    }

    /// Iterates chunks `[from, total_chunks)` in ascending order.
    pub fn ranges_from(&self, from: u32) -> impl Iterator<Item = ChunkRange> + '_ {
        (from..self.total_chunks).filter_map(move |i| self.range(i))
    }

    /// Iterates every chunk in ascending order.
    pub fn ranges(&self) -> impl Iterator<Item = ChunkRange> + '_ {
        self.ranges_from(0)
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads arbitrary chunk ranges out of a file on disk.
pub struct ChunkReader {
    file: std::fs::File,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for ranged reading.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self { file, file_size })
    }

    /// Total file size in bytes, as seen when the reader was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Reads exactly the bytes of `range`.
    ///
    /// Fails with [`TransferError::ShortRead`] if the file ends early,
    /// which happens when it was truncated after planning.
    pub fn read_range(&mut self, range: ChunkRange) -> Result<Vec<u8>, TransferError> {
        self.file.seek(SeekFrom::Start(range.start))?;

        let expected = range.len();
        let mut buf = Vec::with_capacity(expected as usize);
        let actual = (&mut self.file).take(expected).read_to_end(&mut buf)? as u64;
        if actual != expected {
            return Err(TransferError::ShortRead { expected, actual });
        }
        Ok(buf)
    }
}
