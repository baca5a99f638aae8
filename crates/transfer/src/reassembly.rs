//! Client-side reassembly.
//!
//! Chunks may arrive in any order and more than once. The buffer keeps the
//! first copy of every data chunk, remembers where the END_MARKER sat, and
//! writes the file by walking sequence numbers in numeric order.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use ferry_protocol::Payload;

use crate::TransferError;

/// What [`ReceiveBuffer::insert`] did with a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Stored,
    /// A chunk with this sequence number was already held; kept the old one.
    Duplicate,
    EndMarker,
}

/// Ordered mapping from sequence number to payload for one transfer.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    chunks: BTreeMap<u64, Vec<u8>>,
    end_marker: Option<u64>,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything; called at the start of each transfer attempt.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.end_marker = None;
    }

    pub fn insert(&mut self, sequence_number: u64, payload: Payload) -> Inserted {
        match payload {
            Payload::EndMarker => {
                self.end_marker = Some(sequence_number);
                Inserted::EndMarker
            }
            Payload::Data(data) => {
                if self.chunks.contains_key(&sequence_number) {
                    return Inserted::Duplicate;
                }
                self.chunks.insert(sequence_number, data);
                Inserted::Stored
            }
        }
    }

    /// Number of data chunks held.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sequence numbers held, ascending.
    pub fn sequence_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.chunks.keys().copied()
    }

    /// Sequence number the END_MARKER arrived with, if seen.
    pub fn end_marker(&self) -> Option<u64> {
        self.end_marker
    }

    /// Data sequence numbers below the END_MARKER that were never received.
    ///
    /// `None` until the END_MARKER has been seen.
    pub fn missing(&self) -> Option<Vec<u64>> {
        let end = self.end_marker?;
        Some((0..end).filter(|seq| !self.chunks.contains_key(seq)).collect())
    }

    /// Concatenates payloads in sequence-number order.
    pub fn assemble(&self) -> Vec<u8> {
        let total = self.chunks.values().map(Vec::len).sum();
        let mut out = Vec::with_capacity(total);
        for data in self.chunks.values() {
            out.extend_from_slice(data);
        }
        out
    }

    /// Writes the reassembled file to `path`, creating parent directories.
    ///
    /// Returns the number of bytes written.
    pub fn write_to(&self, path: &Path) -> Result<u64, TransferError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        let mut written = 0u64;
        for data in self.chunks.values() {
            file.write_all(data)?;
            written += data.len() as u64;
        }
        file.flush()?;
        Ok(written)
    }
}
