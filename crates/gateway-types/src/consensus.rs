use serde::{Deserialize, Serialize};

/// The three-phase MonadBFT lifecycle a tracked block moves through.
/// Transitions are monotonic: a block never re-enters an earlier phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockPhase {
    Proposed,
    Voted,
    Finalized,
}

impl BlockPhase {
    /// Percentage used by chart overlays: 33 / 66 / 100.
    pub fn progress(self) -> u8 {
        match self {
            BlockPhase::Proposed => 33,
            BlockPhase::Voted => 66,
            BlockPhase::Finalized => 100,
        }
    }
}

/// Per-block lifecycle record owned by the consensus tracker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockConsensusState {
    pub number: u64,
    pub hash: String,
    pub phase: BlockPhase,
    pub tx_count: u64,
    pub proposed_at: u64,
    pub voted_at: Option<u64>,
    pub finalized_at: Option<u64>,
}

impl BlockConsensusState {
    pub fn new(number: u64, hash: String, tx_count: u64, now: u64) -> Self {
        Self {
            number,
            hash,
            phase: BlockPhase::Proposed,
            tx_count,
            proposed_at: now,
            voted_at: None,
            finalized_at: None,
        }
    }

    /// Moves the block to VOTED if it is currently PROPOSED. No-op (and not
    /// an error) if the block is already past VOTED, so repeated calls stay
    /// idempotent.
    pub fn mark_voted(&mut self, now: u64) {
        if self.phase == BlockPhase::Proposed {
            self.phase = BlockPhase::Voted;
            self.voted_at = Some(now);
        }
    }

    /// Moves the block to FINALIZED if it is not already there.
    pub fn mark_finalized(&mut self, now: u64) {
        if self.phase != BlockPhase::Finalized {
            self.phase = BlockPhase::Finalized;
            self.finalized_at = Some(now);
        }
    }
}

/// Snapshot returned by `ConsensusTracker::consensus_state()`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSummary {
    pub current_block: u64,
    pub highest_finalized_block: u64,
    pub blocks_behind: u64,
    pub proposed_count: usize,
    pub voted_count: usize,
    pub finalized_count: usize,
    pub recent_blocks: Vec<BlockConsensusState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_transitions_never_go_backwards() {
        let mut block = BlockConsensusState::new(100, "0xabc".into(), 5, 1_000);
        assert_eq!(block.phase, BlockPhase::Proposed);

        block.mark_finalized(1_002);
        assert_eq!(block.phase, BlockPhase::Finalized);

        // A later mark_voted must not un-finalize the block.
        block.mark_voted(1_003);
        assert_eq!(block.phase, BlockPhase::Finalized);
        assert_eq!(block.finalized_at, Some(1_002));
    }

    #[test]
    fn progress_percentages_match_phase() {
        assert_eq!(BlockPhase::Proposed.progress(), 33);
        assert_eq!(BlockPhase::Voted.progress(), 66);
        assert_eq!(BlockPhase::Finalized.progress(), 100);
    }
}
