use serde::{Deserialize, Serialize};

/// The minimal identifying record of a block observed on the subscription
/// stream, enriched with its transaction count before it is ever handed to
/// a consumer.
///
/// `BlockHeader` is created once per `newHeads` frame and mutated exactly
/// once, by [`BlockHeader::enrich`], when the follow-up
/// `eth_getBlockByNumber` call resolves. It is never mutated again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
    pub timestamp: u64,
    pub tx_count: u64,
    pub gas_used: u64,
}

impl BlockHeader {
    pub fn new(number: u64, hash: String, timestamp: u64, gas_used: u64) -> Self {
        Self {
            number,
            hash,
            timestamp,
            tx_count: 0,
            gas_used,
        }
    }

    /// Fills in the transaction count obtained from the enrichment fetch.
    /// Called at most once per header.
    pub fn enrich(&mut self, tx_count: u64) {
        self.tx_count = tx_count;
    }
}
