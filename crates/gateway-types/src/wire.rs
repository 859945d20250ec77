use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The envelope every server-to-client WebSocket frame is wrapped in:
/// `{topic, key, value, id?}`.
#[derive(Clone, Debug, Serialize)]
pub struct WireMessage {
    pub topic: &'static str,
    pub key: &'static str,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl WireMessage {
    pub fn new(topic: &'static str, key: &'static str, value: Value) -> Self {
        Self { topic, key, value, id: None }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("WireMessage always serializes")
    }
}

pub mod topic {
    pub const SUMMARY: &str = "summary";
    pub const PEERS: &str = "peers";
    pub const EPOCH: &str = "epoch";
    pub const TX_FLOW: &str = "tx_flow";
}

pub mod key {
    pub const VERSION: &str = "version";
    pub const CLUSTER: &str = "cluster";
    pub const IDENTITY_KEY: &str = "identity_key";
    pub const STARTUP_TIME_NANOS: &str = "startup_time_nanos";
    pub const STARTUP_PROGRESS: &str = "startup_progress";
    pub const VOTE_STATE: &str = "vote_state";
    pub const PING: &str = "ping";
    pub const ESTIMATED_SLOT: &str = "estimated_slot";
    pub const ROOT_SLOT: &str = "root_slot";
    pub const COMPLETED_SLOT: &str = "completed_slot";
    pub const ESTIMATED_TPS: &str = "estimated_tps";
    pub const LIVE_TXN_WATERFALL: &str = "live_txn_waterfall";
    pub const MONAD_WATERFALL_V2: &str = "monad_waterfall_v2";
    pub const MONAD_CONSENSUS_STATE: &str = "monad_consensus_state";
    pub const VOTE_DISTANCE: &str = "vote_distance";
    pub const TPS_HISTORY: &str = "tps_history";
    pub const UPDATE: &str = "update";
    pub const NEW: &str = "new";
    pub const TRANSACTION_LOG: &str = "transaction_log";
}

/// An inbound client→server frame. The server accepts these as
/// subscription notifications but is not required to alter its output:
/// all outputs are pre-committed (see broadcast loop design).
#[derive(Clone, Debug, Deserialize)]
pub struct ClientMessage {
    pub topic: String,
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub id: Option<u64>,
}

/// A per-transaction log event forwarded verbatim from the subscriber's
/// `monadLogs` subscription to every registered client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionLog {
    pub tx_hash: String,
    pub block_number: u64,
    pub status: String,
    #[serde(default)]
    pub detail: Value,
}
