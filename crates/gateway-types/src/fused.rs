use serde::{Deserialize, Serialize};

use crate::waterfall::WaterfallGraph;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusInfo {
    pub height: u64,
    pub time: u64,
    pub participation: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub tps: f64,
    pub pending_tx_count: u64,
    pub tracked_tx_count: u64,
    pub gas_price: u64,
    pub parallel_success_rate: f64,
    pub state_size: u64,
}

/// The process-wide current view a broadcast composes from. One writable
/// cell guarded by a lock; readers always copy-by-value before use.
#[derive(Clone, Debug, Serialize)]
pub struct FusedSnapshot {
    pub timestamp: u64,
    pub network: NetworkInfo,
    pub consensus: ConsensusInfo,
    pub execution: ExecutionInfo,
    pub waterfall: WaterfallGraph,
}
