use std::collections::BTreeMap;

use ferry_protocol::{Frame, Payload};

/// A sequence-numbered piece of a file (or the terminal END_MARKER).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in file order, starting at 0.
    pub sequence_number: u64,
    pub payload: Payload,
}

impl Chunk {
    pub fn data(sequence_number: u64, data: Vec<u8>) -> Self {
        Self {
            sequence_number,
            payload: Payload::Data(data),
        }
    }

    pub fn end_marker(sequence_number: u64) -> Self {
        Self {
            sequence_number,
            payload: Payload::EndMarker,
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame::chunk(self.sequence_number, self.payload.clone())
    }
}

/// Chunks of one transfer attempt, ordered by sequence number.
///
/// The server keeps two of these per session: the authoritative set built
/// by the chunker, and the copy actually sent after loss injection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkSet {
    chunks: BTreeMap<u64, Payload>,
}

impl ChunkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a chunk, replacing any chunk with the same sequence number.
    pub fn insert(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.sequence_number, chunk.payload);
    }

    pub(crate) fn remove(&mut self, sequence_number: u64) -> Option<Payload> {
        self.chunks.remove(&sequence_number)
    }

    pub fn get(&self, sequence_number: u64) -> Option<&Payload> {
        self.chunks.get(&sequence_number)
    }

    /// Number of chunks including the END_MARKER.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of data chunks (END_MARKER excluded).
    pub fn data_len(&self) -> usize {
        self.chunks.values().filter(|p| !p.is_end_marker()).count()
    }

    /// Sequence number carrying the END_MARKER, if present.
    pub fn end_marker(&self) -> Option<u64> {
        self.chunks
            .iter()
            .rev()
            .find(|(_, p)| p.is_end_marker())
            .map(|(seq, _)| *seq)
    }

    /// Sequence numbers of the data chunks, ascending.
    pub fn data_sequence_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.chunks
            .iter()
            .filter(|(_, p)| !p.is_end_marker())
            .map(|(seq, _)| *seq)
    }

    /// Chunks in sequence-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Payload)> + '_ {
        self.chunks.iter().map(|(seq, p)| (*seq, p))
    }

    /// Wire frames for every chunk, in sequence-number order.
    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        self.chunks
            .iter()
            .map(|(seq, p)| Frame::chunk(*seq, p.clone()))
    }
}

impl FromIterator<Chunk> for ChunkSet {
    fn from_iter<I: IntoIterator<Item = Chunk>>(iter: I) -> Self {
        let mut set = ChunkSet::new();
        for chunk in iter {
            set.insert(chunk);
        }
        set
    }
}
