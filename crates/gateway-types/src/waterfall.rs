use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusSummary;

/// Names which collector produced the current waterfall. This is the
/// ground-truth signal consumers use to know which upstream is live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceTag {
    #[serde(rename = "prometheus_metrics")]
    PrometheusMetrics,
    #[serde(rename = "real_ipc_metrics")]
    RealIpcMetrics,
    #[serde(rename = "block_estimation")]
    BlockEstimation,
    #[serde(rename = "mock_data")]
    MockData,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::PrometheusMetrics => "prometheus_metrics",
            SourceTag::RealIpcMetrics => "real_ipc_metrics",
            SourceTag::BlockEstimation => "block_estimation",
            SourceTag::MockData => "mock_data",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaterfallNode {
    pub id: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaterfallLink {
    pub source: &'static str,
    pub target: &'static str,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaterfallMetadata {
    pub source: SourceTag,
    pub tps: f64,
    pub pending_tx_count: u64,
    pub tracked_tx_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusSummary>,
}

/// The derived transaction-lifecycle view: a directed graph plus an
/// explicit drops ledger, flow-conserving modulo the named drop reasons.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WaterfallGraph {
    pub nodes: Vec<WaterfallNode>,
    pub links: Vec<WaterfallLink>,
    pub metadata: WaterfallMetadata,
    pub drops: BTreeMap<String, f64>,
}

/// The eleven canonical node ids, in the order every generator emits them.
pub const NODE_SUBMISSION_RPC: &str = "submission_rpc";
pub const NODE_SUBMISSION_P2P: &str = "submission_p2p";
pub const NODE_MEMPOOL: &str = "mempool";
pub const NODE_BLOCK_BUILDING: &str = "block_building";
pub const NODE_CONSENSUS_PROPOSED: &str = "consensus_proposed";
pub const NODE_CONSENSUS_VOTED: &str = "consensus_voted";
pub const NODE_CONSENSUS_FINALIZED: &str = "consensus_finalized";
pub const NODE_EXECUTION: &str = "execution";
pub const NODE_STATE_UPDATE: &str = "state_update";
pub const NODE_FINALITY: &str = "finality";
pub const NODE_DROPPED: &str = "dropped";

pub fn canonical_nodes() -> Vec<WaterfallNode> {
    vec![
        WaterfallNode { id: NODE_SUBMISSION_RPC, label: "Submission (RPC)", color: "#4f46e5" },
        WaterfallNode { id: NODE_SUBMISSION_P2P, label: "Submission (P2P)", color: "#4338ca" },
        WaterfallNode { id: NODE_MEMPOOL, label: "Mempool", color: "#0ea5e9" },
        WaterfallNode { id: NODE_BLOCK_BUILDING, label: "Block Building", color: "#0284c7" },
        WaterfallNode { id: NODE_CONSENSUS_PROPOSED, label: "Proposed", color: "#16a34a" },
        WaterfallNode { id: NODE_CONSENSUS_VOTED, label: "Voted", color: "#15803d" },
        WaterfallNode { id: NODE_CONSENSUS_FINALIZED, label: "Finalized", color: "#166534" },
        WaterfallNode { id: NODE_EXECUTION, label: "Execution", color: "#d97706" },
        WaterfallNode { id: NODE_STATE_UPDATE, label: "State Update", color: "#b45309" },
        WaterfallNode { id: NODE_FINALITY, label: "Finality", color: "#92400e" },
        WaterfallNode { id: NODE_DROPPED, label: "Dropped", color: "#dc2626" },
    ]
}

/// Pushes `(source, target, value)` onto `links` unless `value <= 0`: the
/// generator never emits a zero- or negative-weight edge.
pub fn push_link(links: &mut Vec<WaterfallLink>, source: &'static str, target: &'static str, value: f64) {
    if value > 0.0 {
        links.push(WaterfallLink { source, target, value });
    }
}

/// The pre-existing flat `{in, out}` shape the legacy `/api/v1/waterfall`
/// endpoint serves, computed from the same fused numbers as the v2 graph.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegacyWaterfallResponse {
    pub timestamp: u64,
    pub stages: Vec<LegacyStageEntry>,
    pub summary: LegacyFlowSummary,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyStageEntry {
    pub name: &'static str,
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyFlowSummary {
    #[serde(rename = "in")]
    pub flow_in: BTreeMap<String, f64>,
    #[serde(rename = "out")]
    pub flow_out: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_links_are_never_emitted() {
        let mut links = Vec::new();
        push_link(&mut links, NODE_MEMPOOL, NODE_BLOCK_BUILDING, 0.0);
        push_link(&mut links, NODE_MEMPOOL, NODE_BLOCK_BUILDING, -5.0);
        push_link(&mut links, NODE_MEMPOOL, NODE_BLOCK_BUILDING, 12.5);

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].value, 12.5);
    }

    #[test]
    fn source_tag_round_trips_through_json() {
        for tag in [
            SourceTag::PrometheusMetrics,
            SourceTag::RealIpcMetrics,
            SourceTag::BlockEstimation,
            SourceTag::MockData,
        ] {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag.as_str()));
        }
    }
}
