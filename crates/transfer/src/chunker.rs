use std::io::Read;
use std::path::{Path, PathBuf};

use crate::types::{Chunk, ChunkSet};
use crate::{DEFAULT_CHUNK_SIZE, TransferError, validate_file_name};

/// Resolves `file_name` under `root`, failing with
/// [`TransferError::FileNotFound`] if no regular file exists there.
pub fn resolve_source(root: &Path, file_name: &str) -> Result<PathBuf, TransferError> {
    validate_file_name(file_name)?;
    let path = root.join(file_name);
    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Ok(path),
        Ok(_) => Err(TransferError::FileNotFound(file_name.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TransferError::FileNotFound(file_name.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Splits `root/file_name` into data chunks of at most `chunk_size` bytes
/// followed by an END_MARKER chunk.
pub fn chunk_file(
    root: &Path,
    file_name: &str,
    chunk_size: usize,
) -> Result<ChunkSet, TransferError> {
    let path = resolve_source(root, file_name)?;
    let mut reader = ChunkReader::new(&path, chunk_size)?;

    let mut set = ChunkSet::new();
    while let Some(chunk) = reader.next_chunk()? {
        set.insert(chunk);
    }

    tracing::debug!(
        file = file_name,
        size = reader.file_size(),
        chunks = set.data_len(),
        "file chunked"
    );
    Ok(set)
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file as sequence-numbered chunks.
///
/// Yields the data chunks in file order, then exactly one END_MARKER chunk,
/// then `None`.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    next_sequence: u64,
    offset: u64,
    file_size: u64,
    marker_sent: bool,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            next_sequence: 0,
            offset: 0,
            file_size,
            marker_sent: false,
        })
    }

    /// Reads the next chunk. Returns `None` once the END_MARKER was yielded.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.marker_sent {
            return Ok(None);
        }

        let mut buf = Vec::with_capacity(self.chunk_size.min(self.remaining() as usize));
        let n = (&mut self.file)
            .take(self.chunk_size as u64)
            .read_to_end(&mut buf)?;

        let sequence_number = self.next_sequence;
        self.next_sequence += 1;

        if n == 0 {
            self.marker_sent = true;
            return Ok(Some(Chunk::end_marker(sequence_number)));
        }

        self.offset += n as u64;
        Ok(Some(Chunk::data(sequence_number, buf)))
    }

    /// Total file size in bytes (as seen when opened).
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }
}
