use std::collections::BTreeMap;

use gateway_types::consensus::ConsensusSummary;
use gateway_types::snapshot::{IpcSnapshot, PrometheusSnapshot};
use gateway_types::waterfall::{
    canonical_nodes, push_link, SourceTag, WaterfallGraph, WaterfallLink, WaterfallMetadata,
    LegacyFlowSummary, LegacyStageEntry, LegacyWaterfallResponse, NODE_BLOCK_BUILDING,
    NODE_CONSENSUS_FINALIZED, NODE_CONSENSUS_PROPOSED, NODE_CONSENSUS_VOTED, NODE_DROPPED,
    NODE_EXECUTION, NODE_FINALITY, NODE_MEMPOOL, NODE_STATE_UPDATE, NODE_SUBMISSION_P2P,
    NODE_SUBMISSION_RPC,
};

const PROMETHEUS_SCRAPE_INTERVAL_SECS: f64 = 5.0;
const RPC_P2P_SPLIT: f64 = 0.5;
const BLOCK_ESTIMATION_DROP_SIGNATURE: f64 = 0.01;
const BLOCK_ESTIMATION_DROP_NONCE: f64 = 0.005;
const BLOCK_ESTIMATION_DROP_BALANCE: f64 = 0.002;

/// Everything the generator needs to decide a source and derive a graph,
/// gathered from the individual collectors by the caller (never fetched
/// directly — the generator is a pure function of this input).
pub struct WaterfallInputs<'a> {
    pub prometheus_healthy: bool,
    pub prometheus: &'a PrometheusSnapshot,
    pub ipc_healthy: bool,
    pub ipc: &'a IpcSnapshot,
    pub subscriber_connected: bool,
    pub latest_block_tx_count: Option<u64>,
    pub latest_block_number: Option<u64>,
    pub consensus: ConsensusSummary,
}

/// Chooses the highest-fidelity available source (Prometheus, then IPC,
/// then block estimation, then mock) and derives the canonical eleven-node
/// graph plus the legacy flat shape from the same numbers.
pub fn generate(inputs: &WaterfallInputs) -> WaterfallGraph {
    if prometheus_qualifies(inputs) {
        from_prometheus(inputs)
    } else if inputs.ipc_healthy {
        from_ipc(inputs)
    } else if inputs.subscriber_connected && inputs.latest_block_tx_count.is_some() {
        from_block_estimation(inputs)
    } else {
        mock(inputs)
    }
}

fn prometheus_qualifies(inputs: &WaterfallInputs) -> bool {
    inputs.prometheus_healthy
        && inputs.prometheus.rates.tx_commits_rate > 0.0
        && (inputs.prometheus.rates.insert_owned_rate > 0.0 || inputs.prometheus.rates.insert_forwarded_rate > 0.0)
}

fn from_prometheus(inputs: &WaterfallInputs) -> WaterfallGraph {
    let rates = &inputs.prometheus.rates;
    let interval = PROMETHEUS_SCRAPE_INTERVAL_SECS;

    let rpc = rates.insert_owned_rate * interval;
    let p2p = rates.insert_forwarded_rate * interval;
    let drop_signature = rates.drop_invalid_signature_rate * interval;
    let drop_nonce = rates.drop_nonce_invalid_rate * interval;
    let drop_balance = rates.drop_insufficient_balance_rate * interval;
    let drop_block_full = rates.drop_block_full_rate * interval;
    let drop_fee = rates.drop_fee_too_low_rate * interval;

    let to_mempool = (rpc + p2p - drop_signature).max(0.0);
    let to_block_building = (to_mempool - drop_nonce).max(0.0);
    let to_consensus = (to_block_building - drop_balance - drop_block_full - drop_fee).max(0.0);

    let mut drops = BTreeMap::new();
    drops.insert("invalid_signature".to_string(), drop_signature);
    drops.insert("nonce_invalid".to_string(), drop_nonce);
    drops.insert("insufficient_balance".to_string(), drop_balance);
    drops.insert("block_full".to_string(), drop_block_full);
    drops.insert("fee_too_low".to_string(), drop_fee);

    let metadata = WaterfallMetadata {
        source: SourceTag::PrometheusMetrics,
        tps: inputs.prometheus.rates.tps,
        pending_tx_count: inputs.prometheus.counters.pending_tx_count,
        tracked_tx_count: inputs.prometheus.counters.tracked_tx_count,
        block_height: inputs.latest_block_number,
        consensus: Some(inputs.consensus.clone()),
    };

    build_graph(rpc, p2p, drop_signature, drop_nonce, drop_balance + drop_block_full + drop_fee, to_consensus, metadata, drops)
}

fn from_ipc(inputs: &WaterfallInputs) -> WaterfallGraph {
    let txpool = &inputs.ipc.txpool;
    let rpc = txpool.insert_owned_total as f64;
    let p2p = txpool.insert_forwarded_total as f64;
    let drop_signature = txpool.drop_invalid_signature_total as f64;
    let drop_nonce = txpool.drop_nonce_invalid_total as f64;
    let drop_rest = (txpool.drop_insufficient_balance_total
        + txpool.drop_block_full_total
        + txpool.drop_fee_too_low_total) as f64;

    let to_mempool = (rpc + p2p - drop_signature).max(0.0);
    let to_block_building = (to_mempool - drop_nonce).max(0.0);
    let to_consensus = (to_block_building - drop_rest).max(0.0);

    let mut drops = BTreeMap::new();
    drops.insert("invalid_signature".to_string(), drop_signature);
    drops.insert("nonce_invalid".to_string(), drop_nonce);
    drops.insert("insufficient_balance".to_string(), txpool.drop_insufficient_balance_total as f64);
    drops.insert("block_full".to_string(), txpool.drop_block_full_total as f64);
    drops.insert("fee_too_low".to_string(), txpool.drop_fee_too_low_total as f64);

    let metadata = WaterfallMetadata {
        source: SourceTag::RealIpcMetrics,
        tps: txpool.tps,
        pending_tx_count: txpool.pending_tx_count,
        tracked_tx_count: txpool.tracked_tx_count,
        block_height: inputs.latest_block_number,
        consensus: Some(inputs.consensus.clone()),
    };

    build_graph(rpc, p2p, drop_signature, drop_nonce, drop_rest, to_consensus, metadata, drops)
}

fn from_block_estimation(inputs: &WaterfallInputs) -> WaterfallGraph {
    let tx_count = inputs.latest_block_tx_count.unwrap_or(0) as f64;
    let rpc = tx_count * RPC_P2P_SPLIT;
    let p2p = tx_count * RPC_P2P_SPLIT;
    let total = rpc + p2p;

    let drop_signature = total * BLOCK_ESTIMATION_DROP_SIGNATURE;
    let to_mempool = (total - drop_signature).max(0.0);
    let drop_nonce = to_mempool * BLOCK_ESTIMATION_DROP_NONCE;
    let to_block_building = (to_mempool - drop_nonce).max(0.0);
    let drop_balance = to_block_building * BLOCK_ESTIMATION_DROP_BALANCE;
    let to_consensus = (to_block_building - drop_balance).max(0.0);

    let mut drops = BTreeMap::new();
    drops.insert("invalid_signature".to_string(), drop_signature);
    drops.insert("nonce_invalid".to_string(), drop_nonce);
    drops.insert("insufficient_balance".to_string(), drop_balance);

    let metadata = WaterfallMetadata {
        source: SourceTag::BlockEstimation,
        tps: tx_count / 0.4,
        pending_tx_count: 0,
        tracked_tx_count: 0,
        block_height: inputs.latest_block_number,
        consensus: Some(inputs.consensus.clone()),
    };

    build_graph(rpc, p2p, drop_signature, drop_nonce, drop_balance, to_consensus, metadata, drops)
}

fn mock(inputs: &WaterfallInputs) -> WaterfallGraph {
    let metadata = WaterfallMetadata {
        source: SourceTag::MockData,
        tps: 0.0,
        pending_tx_count: 0,
        tracked_tx_count: 0,
        block_height: None,
        consensus: Some(inputs.consensus.clone()),
    };
    build_graph(100.0, 100.0, 2.0, 1.0, 1.0, 196.0, metadata, BTreeMap::new())
}

/// Wires the seven derived stage quantities through the eleven canonical
/// nodes, folding every named drop into the single `dropped` node. Every
/// interior node's inflow is recomputed here from the same `rpc`/`p2p`/
/// `drop_*` quantities that fed the outflow, so each node's Σin equals its
/// Σout plus whatever it routes to `dropped` — the signature drop leaves the
/// flow at the submission nodes before `mempool` ever sees it, and the nonce
/// drop leaves at `mempool` before `block_building` sees it. Edges with
/// value ≤ 0 are never emitted, per [`push_link`].
#[allow(clippy::too_many_arguments)]
fn build_graph(
    rpc: f64,
    p2p: f64,
    drop_signature: f64,
    drop_nonce: f64,
    drop_other: f64,
    to_consensus: f64,
    metadata: WaterfallMetadata,
    drops: BTreeMap<String, f64>,
) -> WaterfallGraph {
    let mut links: Vec<WaterfallLink> = Vec::new();

    let submission_total = (rpc + p2p).max(1.0);
    let drop_signature_rpc = drop_signature * (rpc / submission_total);
    let drop_signature_p2p = drop_signature - drop_signature_rpc;

    let to_mempool = (rpc + p2p - drop_signature).max(0.0);
    let to_block_building = (to_mempool - drop_nonce).max(0.0);

    push_link(&mut links, NODE_SUBMISSION_RPC, NODE_MEMPOOL, rpc - drop_signature_rpc);
    push_link(&mut links, NODE_SUBMISSION_P2P, NODE_MEMPOOL, p2p - drop_signature_p2p);
    push_link(&mut links, NODE_SUBMISSION_RPC, NODE_DROPPED, drop_signature_rpc);
    push_link(&mut links, NODE_SUBMISSION_P2P, NODE_DROPPED, drop_signature_p2p);
    push_link(&mut links, NODE_MEMPOOL, NODE_BLOCK_BUILDING, to_block_building);
    push_link(&mut links, NODE_MEMPOOL, NODE_DROPPED, to_mempool - to_block_building);
    push_link(&mut links, NODE_BLOCK_BUILDING, NODE_CONSENSUS_PROPOSED, to_consensus);
    push_link(&mut links, NODE_BLOCK_BUILDING, NODE_DROPPED, to_block_building - to_consensus);
    push_link(&mut links, NODE_CONSENSUS_PROPOSED, NODE_CONSENSUS_VOTED, to_consensus);
    push_link(&mut links, NODE_CONSENSUS_VOTED, NODE_CONSENSUS_FINALIZED, to_consensus);
    push_link(&mut links, NODE_CONSENSUS_FINALIZED, NODE_EXECUTION, to_consensus);
    push_link(&mut links, NODE_EXECUTION, NODE_STATE_UPDATE, to_consensus);
    push_link(&mut links, NODE_STATE_UPDATE, NODE_FINALITY, to_consensus);

    WaterfallGraph { nodes: canonical_nodes(), links, metadata, drops }
}

/// The pre-existing flat `{in, out}` shape served at `/api/v1/waterfall`,
/// computed from the same graph the v2 endpoint serves.
pub fn to_legacy(graph: &WaterfallGraph, timestamp: u64) -> LegacyWaterfallResponse {
    let mut flow_in = BTreeMap::new();
    let mut flow_out = BTreeMap::new();
    for link in &graph.links {
        *flow_out.entry(link.source.to_string()).or_insert(0.0) += link.value;
        *flow_in.entry(link.target.to_string()).or_insert(0.0) += link.value;
    }

    let stages = graph
        .nodes
        .iter()
        .map(|node| LegacyStageEntry {
            name: node.id,
            value: *flow_in.get(node.id).or_else(|| flow_out.get(node.id)).unwrap_or(&0.0),
        })
        .collect();

    LegacyWaterfallResponse {
        timestamp,
        stages,
        summary: LegacyFlowSummary { flow_in, flow_out },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::snapshot::{PrometheusCounters, PrometheusRates};

    fn base_inputs() -> (PrometheusSnapshot, IpcSnapshot) {
        (PrometheusSnapshot::default(), IpcSnapshot::default())
    }

    #[test]
    fn selects_prometheus_when_commits_and_inserts_active() {
        let (mut prom, ipc) = base_inputs();
        prom.rates = PrometheusRates { tx_commits_rate: 10.0, insert_owned_rate: 10.0, tps: 10.0, ..Default::default() };
        prom.counters = PrometheusCounters { tx_commits_total: 150, ..Default::default() };

        let inputs = WaterfallInputs {
            prometheus_healthy: true,
            prometheus: &prom,
            ipc_healthy: false,
            ipc: &ipc,
            subscriber_connected: false,
            latest_block_tx_count: None,
            latest_block_number: None,
            consensus: ConsensusSummary::default(),
        };

        let graph = generate(&inputs);
        assert_eq!(graph.metadata.source, SourceTag::PrometheusMetrics);
        assert!(graph.links.iter().all(|l| l.value > 0.0));
    }

    #[test]
    fn falls_through_to_block_estimation_when_nothing_else_qualifies() {
        let (prom, ipc) = base_inputs();
        let inputs = WaterfallInputs {
            prometheus_healthy: false,
            prometheus: &prom,
            ipc_healthy: false,
            ipc: &ipc,
            subscriber_connected: true,
            latest_block_tx_count: Some(200),
            latest_block_number: Some(42),
            consensus: ConsensusSummary::default(),
        };

        let graph = generate(&inputs);
        assert_eq!(graph.metadata.source, SourceTag::BlockEstimation);
        assert_eq!(graph.metadata.block_height, Some(42));
    }

    #[test]
    fn falls_through_to_mock_when_nothing_is_available() {
        let (prom, ipc) = base_inputs();
        let inputs = WaterfallInputs {
            prometheus_healthy: false,
            prometheus: &prom,
            ipc_healthy: false,
            ipc: &ipc,
            subscriber_connected: false,
            latest_block_tx_count: None,
            latest_block_number: None,
            consensus: ConsensusSummary::default(),
        };
        let graph = generate(&inputs);
        assert_eq!(graph.metadata.source, SourceTag::MockData);
    }

    #[test]
    fn interior_nodes_conserve_flow_with_nonzero_drops() {
        // rpc=10, p2p=2, drop_signature=2, drop_nonce=1, drop_other=0, to_consensus=9
        let graph = build_graph(10.0, 2.0, 2.0, 1.0, 0.0, 9.0, WaterfallMetadata {
            source: SourceTag::MockData,
            tps: 0.0,
            pending_tx_count: 0,
            tracked_tx_count: 0,
            block_height: None,
            consensus: None,
        }, BTreeMap::new());

        let inflow = |node: &str| -> f64 { graph.links.iter().filter(|l| l.target == node).map(|l| l.value).sum() };
        let outflow = |node: &str| -> f64 { graph.links.iter().filter(|l| l.source == node).map(|l| l.value).sum() };

        // mempool receives rpc+p2p minus the signature drop (which leaves at
        // the submission nodes), not the raw rpc+p2p.
        assert!((inflow(NODE_MEMPOOL) - 10.0).abs() < 1e-9, "mempool inflow was {}", inflow(NODE_MEMPOOL));
        assert!(
            (inflow(NODE_MEMPOOL) - outflow(NODE_MEMPOOL)).abs() < 1e-9,
            "mempool did not conserve: in={} out={}",
            inflow(NODE_MEMPOOL),
            outflow(NODE_MEMPOOL)
        );

        // block_building receives to_mempool minus the nonce drop (which
        // leaves at mempool), not to_consensus+drop_nonce+drop_other.
        assert!((inflow(NODE_BLOCK_BUILDING) - 9.0).abs() < 1e-9, "block_building inflow was {}", inflow(NODE_BLOCK_BUILDING));
        assert!(
            (inflow(NODE_BLOCK_BUILDING) - outflow(NODE_BLOCK_BUILDING)).abs() < 1e-9,
            "block_building did not conserve: in={} out={}",
            inflow(NODE_BLOCK_BUILDING),
            outflow(NODE_BLOCK_BUILDING)
        );
    }

    #[test]
    fn no_link_has_nonpositive_value() {
        let (mut prom, ipc) = base_inputs();
        prom.rates = PrometheusRates { tx_commits_rate: 10.0, insert_owned_rate: 10.0, insert_forwarded_rate: 2.0, ..Default::default() };
        let inputs = WaterfallInputs {
            prometheus_healthy: true,
            prometheus: &prom,
            ipc_healthy: false,
            ipc: &ipc,
            subscriber_connected: false,
            latest_block_tx_count: None,
            latest_block_number: None,
            consensus: ConsensusSummary::default(),
        };
        let graph = generate(&inputs);
        for link in &graph.links {
            assert!(link.value > 0.0, "link {:?} -> {:?} had non-positive value", link.source, link.target);
        }
    }
}
