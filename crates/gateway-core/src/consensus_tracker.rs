use std::collections::BTreeMap;

use gateway_types::consensus::{BlockConsensusState, BlockPhase, ConsensusSummary};
use parking_lot::RwLock;

/// Labels each recently observed block with its consensus phase, inferring
/// transitions purely from the arrival of later blocks. There is no direct
/// signal from the upstream for VOTED/FINALIZED; block `N` arriving implies
/// `N-1` was voted and `N-2` was finalized.
pub struct ConsensusTracker {
    max_history: u64,
    blocks: RwLock<BTreeMap<u64, BlockConsensusState>>,
    highest_finalized: RwLock<Option<u64>>,
}

impl ConsensusTracker {
    pub fn new(max_history: u64) -> Self {
        Self {
            max_history,
            blocks: RwLock::new(BTreeMap::new()),
            highest_finalized: RwLock::new(None),
        }
    }

    /// Upserts block `n` at PROPOSED, transitions `n-1` to VOTED and `n-2`
    /// to FINALIZED if present, then evicts anything older than
    /// `n - max_history`. Idempotent for a given `n`: calling this again for
    /// a block already seen re-upserts it at PROPOSED only if it has not
    /// already progressed past that phase.
    pub fn on_block_proposed(&self, n: u64, hash: String, now: u64, tx_count: u64) {
        let mut blocks = self.blocks.write();

        blocks
            .entry(n)
            .or_insert_with(|| BlockConsensusState::new(n, hash, tx_count, now));

        if n > 0 {
            if let Some(prev) = blocks.get_mut(&(n - 1)) {
                prev.mark_voted(now);
            }
        }
        if n > 1 {
            if let Some(grandparent) = blocks.get_mut(&(n - 2)) {
                let was_finalized = grandparent.phase == BlockPhase::Finalized;
                grandparent.mark_finalized(now);
                if !was_finalized {
                    let mut highest = self.highest_finalized.write();
                    if highest.map_or(true, |h| grandparent.number > h) {
                        *highest = Some(grandparent.number);
                    }
                }
            }
        }

        let floor = n.saturating_sub(self.max_history);
        blocks.retain(|&num, _| num >= floor);
    }

    pub fn on_block_voted(&self, n: u64, now: u64) {
        if let Some(block) = self.blocks.write().get_mut(&n) {
            block.mark_voted(now);
        }
    }

    pub fn on_block_finalized(&self, n: u64, now: u64) {
        let mut blocks = self.blocks.write();
        if let Some(block) = blocks.get_mut(&n) {
            let was_finalized = block.phase == BlockPhase::Finalized;
            block.mark_finalized(now);
            if !was_finalized {
                let mut highest = self.highest_finalized.write();
                if highest.map_or(true, |h| n > h) {
                    *highest = Some(n);
                }
            }
        }
    }

    pub fn consensus_state(&self) -> ConsensusSummary {
        let blocks = self.blocks.read();
        let current_block = blocks.keys().next_back().copied().unwrap_or(0);
        let highest_finalized_block = self.highest_finalized.read().unwrap_or(0);

        let mut proposed_count = 0usize;
        let mut voted_count = 0usize;
        let mut finalized_count = 0usize;
        for block in blocks.values() {
            match block.phase {
                BlockPhase::Proposed => proposed_count += 1,
                BlockPhase::Voted => voted_count += 1,
                BlockPhase::Finalized => finalized_count += 1,
            }
        }

        ConsensusSummary {
            current_block,
            highest_finalized_block,
            blocks_behind: current_block.saturating_sub(highest_finalized_block),
            proposed_count,
            voted_count,
            finalized_count,
            recent_blocks: self.recent_blocks(blocks.len() as u64),
        }
    }

    /// Returns up to `k` most recent blocks, highest block number first.
    pub fn recent_blocks(&self, k: u64) -> Vec<BlockConsensusState> {
        let blocks = self.blocks.read();
        blocks.values().rev().take(k as usize).cloned().collect()
    }

    pub fn block_phase(&self, n: u64) -> Option<BlockPhase> {
        self.blocks.read().get(&n).map(|b| b.phase)
    }

    pub fn phase_progress(&self, n: u64) -> u8 {
        self.block_phase(n).map(|phase| phase.progress()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrival_of_later_blocks_drives_transitions() {
        let tracker = ConsensusTracker::new(20);
        tracker.on_block_proposed(1, "0x1".into(), 100, 10);
        assert_eq!(tracker.block_phase(1), Some(BlockPhase::Proposed));

        tracker.on_block_proposed(2, "0x2".into(), 101, 12);
        assert_eq!(tracker.block_phase(1), Some(BlockPhase::Voted));
        assert_eq!(tracker.block_phase(2), Some(BlockPhase::Proposed));

        tracker.on_block_proposed(3, "0x3".into(), 102, 8);
        assert_eq!(tracker.block_phase(1), Some(BlockPhase::Finalized));
        assert_eq!(tracker.block_phase(2), Some(BlockPhase::Voted));
        assert_eq!(tracker.block_phase(3), Some(BlockPhase::Proposed));
    }

    #[test]
    fn finalized_block_never_reverts() {
        let tracker = ConsensusTracker::new(20);
        tracker.on_block_proposed(1, "0x1".into(), 100, 10);
        tracker.on_block_finalized(1, 105);
        assert_eq!(tracker.block_phase(1), Some(BlockPhase::Finalized));

        tracker.on_block_voted(1, 110);
        assert_eq!(tracker.block_phase(1), Some(BlockPhase::Finalized));
    }

    #[test]
    fn eviction_keeps_size_bounded() {
        let tracker = ConsensusTracker::new(5);
        for n in 0..20u64 {
            tracker.on_block_proposed(n, format!("0x{n:x}"), 100 + n, 1);
        }
        let summary = tracker.consensus_state();
        assert!(summary.recent_blocks.len() as u64 <= 5);
        assert!(summary.blocks_behind >= 0);
    }

    #[test]
    fn recent_blocks_are_descending_by_number() {
        let tracker = ConsensusTracker::new(20);
        for n in 0..5u64 {
            tracker.on_block_proposed(n, format!("0x{n:x}"), 100 + n, 1);
        }
        let recent = tracker.recent_blocks(3);
        let numbers: Vec<u64> = recent.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![4, 3, 2]);
    }
}
