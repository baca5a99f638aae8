//! Loss injection.
//!
//! Emulates datagram loss by withholding randomly chosen data chunks from
//! the copy of a [`ChunkSet`] that goes on the wire. The END_MARKER is never
//! withheld, so every transmission terminates. The random source is a type
//! parameter; [`LossSimulator::seeded`] gives reproducible runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::ChunkSet;

/// Result of applying loss to an authoritative chunk set.
#[derive(Debug, Clone)]
pub struct LossOutcome {
    /// Chunks to transmit.
    pub sent: ChunkSet,
    /// Sequence numbers withheld, ascending.
    pub withheld: Vec<u64>,
}

/// Withholds chunks chosen uniformly at random.
#[derive(Debug)]
pub struct LossSimulator<R = StdRng> {
    rng: R,
}

impl LossSimulator<StdRng> {
    /// Deterministic simulator: equal seeds withhold equal chunks.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> LossSimulator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Withholds up to `discard` data chunks from a copy of `authoritative`.
    ///
    /// `authoritative` itself is left untouched. When `discard` covers every
    /// data chunk, only the END_MARKER remains.
    pub fn apply(&mut self, authoritative: &ChunkSet, discard: u64) -> LossOutcome {
        let candidates: Vec<u64> = authoritative.data_sequence_numbers().collect();
        let amount = usize::try_from(discard).unwrap_or(usize::MAX);

        let mut withheld: Vec<u64> = if amount >= candidates.len() {
            candidates
        } else {
            rand::seq::index::sample(&mut self.rng, candidates.len(), amount)
                .into_iter()
                .map(|i| candidates[i])
                .collect()
        };
        withheld.sort_unstable();

        let mut sent = authoritative.clone();
        for seq in &withheld {
            sent.remove(*seq);
        }

        LossOutcome { sent, withheld }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn chunks(data_count: u64) -> ChunkSet {
        let mut set: ChunkSet = (0..data_count)
            .map(|seq| Chunk::data(seq, vec![seq as u8; 4]))
            .collect();
        set.insert(Chunk::end_marker(data_count));
        set
    }

    #[test]
    fn zero_discard_sends_everything() {
        let set = chunks(5);
        let outcome = LossSimulator::seeded(1).apply(&set, 0);
        assert_eq!(outcome.sent, set);
        assert!(outcome.withheld.is_empty());
    }

    #[test]
    fn withholds_exactly_k_data_chunks() {
        let set = chunks(20);
        for k in 1..20 {
            let outcome = LossSimulator::seeded(k).apply(&set, k);
            assert_eq!(outcome.withheld.len() as u64, k);
            assert_eq!(outcome.sent.data_len() as u64, 20 - k);
            assert_eq!(outcome.sent.end_marker(), Some(20));
            for seq in &outcome.withheld {
                assert!(*seq < 20);
                assert!(outcome.sent.get(*seq).is_none());
            }
        }
    }

    #[test]
    fn discard_at_or_above_count_leaves_only_marker() {
        let set = chunks(3);
        for k in [3, 4, u64::MAX] {
            let outcome = LossSimulator::seeded(7).apply(&set, k);
            assert_eq!(outcome.sent.len(), 1);
            assert_eq!(outcome.sent.end_marker(), Some(3));
            assert_eq!(outcome.withheld, vec![0, 1, 2]);
        }
    }

    #[test]
    fn authoritative_set_is_not_mutated() {
        let set = chunks(6);
        let before = set.clone();
        let _ = LossSimulator::seeded(3).apply(&set, 4);
        assert_eq!(set, before);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let set = chunks(50);
        let a = LossSimulator::seeded(42).apply(&set, 10);
        let b = LossSimulator::seeded(42).apply(&set, 10);
        assert_eq!(a.withheld, b.withheld);
        assert_eq!(a.sent, b.sent);
    }

    #[test]
    fn sent_and_withheld_partition_the_data() {
        let set = chunks(12);
        let outcome = LossSimulator::from_entropy().apply(&set, 5);
        let mut all: Vec<u64> = outcome.sent.data_sequence_numbers().collect();
        all.extend(&outcome.withheld);
        all.sort_unstable();
        assert_eq!(all, (0..12).collect::<Vec<_>>());
    }
}
