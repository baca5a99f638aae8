use std::collections::BTreeSet;

use crate::types::{Chunk, ChunkSet};

/// Data sequence numbers in `authoritative` absent from `claimed`.
///
/// The END_MARKER is never part of the result.
pub fn missing_sequence_numbers(authoritative: &ChunkSet, claimed: &BTreeSet<u64>) -> Vec<u64> {
    authoritative
        .data_sequence_numbers()
        .filter(|seq| !claimed.contains(seq))
        .collect()
}

/// Server-side bookkeeping for one retransmission round.
///
/// Collects the sequence numbers the client reports holding; the reply is
/// the authoritative set minus those claims.
#[derive(Debug, Default)]
pub struct RetransmitRound {
    claimed: BTreeSet<u64>,
}

impl RetransmitRound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a claim; returns `false` if it was already recorded.
    pub fn claim(&mut self, sequence_number: u64) -> bool {
        self.claimed.insert(sequence_number)
    }

    pub fn claimed_len(&self) -> usize {
        self.claimed.len()
    }

    /// Chunks the client lacks, ascending by sequence number.
    pub fn missing(&self, authoritative: &ChunkSet) -> Vec<Chunk> {
        missing_sequence_numbers(authoritative, &self.claimed)
            .into_iter()
            .filter_map(|seq| {
                authoritative.get(seq).map(|payload| Chunk {
                    sequence_number: seq,
                    payload: payload.clone(),
                })
            })
            .collect()
    }
}
