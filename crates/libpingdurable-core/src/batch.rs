//! Transactional commit accounting for the send phase

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Counter snapshot reported at the end of the send phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub sent: u64,
    pub committed: u64,
    pub not_committed: u64,
}

/// Tracks sent-but-unconfirmed vs. committed messages.
///
/// A commit reported by the transport covers every message published since
/// the previous commit, so all pending messages move to committed at once.
/// Invariant: `committed + not_committed == sent`.
#[derive(Debug, Clone)]
pub struct CommitBatcher {
    batch_size: u32,
    committed: u64,
    not_committed: u64,
}

impl CommitBatcher {
    pub fn new(batch_size: u32) -> Self {
        Self {
            batch_size: batch_size.max(1),
            committed: 0,
            not_committed: 0,
        }
    }

    /// Record one successful publish.
    ///
    /// Returns the number of messages moved to committed, if this publish
    /// closed a transaction.
    pub fn record_send(&mut self, committed: bool) -> Option<u64> {
        self.not_committed += 1;

        if committed {
            let moved = self.not_committed;
            debug!(moved, "adding messages to the committed count");
            self.committed += moved;
            self.not_committed = 0;
            return Some(moved);
        }

        if self.not_committed > u64::from(self.batch_size) {
            warn!(
                not_committed = self.not_committed,
                batch_size = self.batch_size,
                "transport exceeded the commit batch size without committing"
            );
        }
        None
    }

    pub fn sent(&self) -> u64 {
        self.committed + self.not_committed
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn not_committed(&self) -> u64 {
        self.not_committed
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn counts(&self) -> BatchCounts {
        BatchCounts {
            sent: self.sent(),
            committed: self.committed,
            not_committed: self.not_committed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_moves_everything_pending() {
        let mut batcher = CommitBatcher::new(3);
        assert_eq!(batcher.record_send(false), None);
        assert_eq!(batcher.record_send(false), None);
        assert_eq!(batcher.not_committed(), 2);

        assert_eq!(batcher.record_send(true), Some(3));
        assert_eq!(batcher.committed(), 3);
        assert_eq!(batcher.not_committed(), 0);
        assert_eq!(batcher.sent(), 3);
    }

    #[test]
    fn test_sum_invariant_for_every_outcome_sequence() {
        // Every commit pattern of length 10.
        for pattern in 0u32..(1 << 10) {
            let mut batcher = CommitBatcher::new(10);
            for i in 0..10 {
                batcher.record_send(pattern & (1 << i) != 0);
                let counts = batcher.counts();
                assert_eq!(counts.committed + counts.not_committed, counts.sent);
                assert_eq!(counts.sent, i as u64 + 1);
            }
        }
    }

    #[test]
    fn test_commit_every_bth_bounds_pending() {
        for b in 1u32..=12 {
            let mut batcher = CommitBatcher::new(b);
            for call in 1..=(b as u64 * 7) {
                let commit = call % b as u64 == 0;
                batcher.record_send(commit);

                if commit {
                    assert_eq!(batcher.not_committed(), 0);
                } else {
                    assert!(batcher.not_committed() <= b as u64 - 1);
                }
            }
            assert_eq!(batcher.committed(), b as u64 * 7);
        }
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let batcher = CommitBatcher::new(0);
        assert_eq!(batcher.batch_size(), 1);
    }
}
