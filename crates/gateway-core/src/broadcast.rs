use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_types::wire::{key, topic, ClientMessage, TransactionLog, WireMessage};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collectors::BlockSubscriber;
use crate::consensus_tracker::ConsensusTracker;
use crate::fused_store::FusedSnapshotStore;
use crate::metrics::GatewayMetrics;
use crate::registry::ClientRegistry;
use crate::waterfall::to_legacy;

/// Abstracts the actual WebSocket write so the broadcast loop itself has no
/// dependency on the HTTP front door's framework. The front door implements
/// this for its own socket type at the point of upgrade.
#[async_trait]
pub trait ClientSink: Send {
    async fn send_text(&mut self, text: String) -> bool;
    async fn try_recv_client_message(&mut self) -> Option<ClientMessage>;
}

/// Shared, read-only context every per-client broadcast task pulls from.
pub struct BroadcastContext {
    pub store: Arc<FusedSnapshotStore>,
    pub consensus: Arc<ConsensusTracker>,
    pub subscriber: Arc<BlockSubscriber>,
    pub registry: Arc<ClientRegistry>,
    pub metrics: Arc<GatewayMetrics>,
    pub tick: Duration,
    pub tps_cadence: Duration,
    pub network_name: String,
    pub network_version: String,
}

/// Runs the full per-client lifecycle: handshake, then the ticked
/// composition loop, interleaved with transaction-log fan-out delivered on
/// `logs_rx`. Returns when the sink reports a write failure or the socket
/// closes; the caller is responsible for deregistering the client.
pub async fn run_client<S: ClientSink>(
    mut sink: S,
    client_id: u64,
    ctx: Arc<BroadcastContext>,
    mut logs_rx: mpsc::Receiver<TransactionLog>,
) {
    if !send_handshake(&mut sink, &ctx).await {
        return;
    }

    let mut ticker = tokio::time::interval(ctx.tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_seen_height = 0u64;
    let mut last_tps_send = 0u64;
    let ping_count = AtomicU64::new(0);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !run_tick(&mut sink, &ctx, &mut last_seen_height, &mut last_tps_send, &ping_count).await {
                    ctx.metrics.broadcast_write_failures_total.inc();
                    break;
                }
            }
            log = logs_rx.recv() => {
                match log {
                    Some(log) => {
                        let message = WireMessage::new(topic::TX_FLOW, key::TRANSACTION_LOG, json!(log)).to_json();
                        if !sink.send_text(message.to_string()).await {
                            ctx.metrics.broadcast_write_failures_total.inc();
                            break;
                        }
                    }
                    None => {
                        // Sender side (the registry) dropped this client's inbox; treat as a
                        // deregistration signal and end the loop.
                        break;
                    }
                }
            }
            inbound = sink.try_recv_client_message() => {
                if let Some(msg) = inbound {
                    debug!(client_id, topic = %msg.topic, key = %msg.key, "received client message, output is pre-committed");
                }
            }
        }
    }

    let _ = client_id;
}

async fn send_handshake<S: ClientSink>(sink: &mut S, ctx: &BroadcastContext) -> bool {
    let messages = [
        WireMessage::new(topic::SUMMARY, key::VERSION, json!(env!("CARGO_PKG_VERSION"))),
        WireMessage::new(topic::SUMMARY, key::CLUSTER, json!(ctx.network_name)),
        WireMessage::new(topic::SUMMARY, key::IDENTITY_KEY, json!(ctx.network_version)),
        WireMessage::new(topic::SUMMARY, key::STARTUP_TIME_NANOS, json!(now_unix() * 1_000_000_000)),
        WireMessage::new(topic::SUMMARY, key::STARTUP_PROGRESS, json!({"phase": "ready", "percent": 100})),
        WireMessage::new(topic::SUMMARY, key::VOTE_STATE, json!("active")),
    ];
    for message in messages {
        if !sink.send_text(message.to_json().to_string()).await {
            return false;
        }
    }

    let peers_update = WireMessage::new(topic::PEERS, key::UPDATE, json!([]));
    if !sink.send_text(peers_update.to_json().to_string()).await {
        return false;
    }

    let epoch = WireMessage::new(topic::EPOCH, key::NEW, json!({"epoch": 0}));
    sink.send_text(epoch.to_json().to_string()).await
}

async fn run_tick<S: ClientSink>(
    sink: &mut S,
    ctx: &BroadcastContext,
    last_seen_height: &mut u64,
    last_tps_send: &mut u64,
    ping_count: &AtomicU64,
) -> bool {
    let consensus = ctx.consensus.consensus_state();
    let height = consensus.current_block;
    let is_new_block = height != *last_seen_height;
    let now = now_unix();
    let should_update_tps = now.saturating_sub(*last_tps_send) >= ctx.tps_cadence.as_secs();

    let ping = WireMessage::new(topic::SUMMARY, key::PING, json!(ping_count.fetch_add(1, Ordering::Relaxed)));
    let estimated_slot = WireMessage::new(topic::SUMMARY, key::ESTIMATED_SLOT, json!(height));
    let root_slot = WireMessage::new(topic::SUMMARY, key::ROOT_SLOT, json!(consensus.highest_finalized_block));
    let completed_slot = WireMessage::new(topic::SUMMARY, key::COMPLETED_SLOT, json!(height));
    let vote_distance = WireMessage::new(topic::SUMMARY, key::VOTE_DISTANCE, json!(consensus.blocks_behind));
    let consensus_state = WireMessage::new(topic::SUMMARY, key::MONAD_CONSENSUS_STATE, json!(consensus));

    let always_on = [ping, estimated_slot, root_slot, completed_slot, vote_distance, consensus_state];
    for message in always_on {
        if !sink.send_text(message.to_json().to_string()).await {
            return false;
        }
    }

    if let Some(snapshot) = ctx.store.current() {
        let legacy = to_legacy(&snapshot.waterfall, snapshot.timestamp);
        let legacy_message = WireMessage::new(topic::SUMMARY, key::LIVE_TXN_WATERFALL, json!(legacy));
        let v2_message = WireMessage::new(topic::SUMMARY, key::MONAD_WATERFALL_V2, json!(snapshot.waterfall));
        for message in [legacy_message, v2_message] {
            if !sink.send_text(message.to_json().to_string()).await {
                return false;
            }
        }
    }

    if should_update_tps {
        let one_second = ctx.subscriber.one_second_tps();
        let estimated_tps = WireMessage::new(topic::SUMMARY, key::ESTIMATED_TPS, json!(one_second));
        if !sink.send_text(estimated_tps.to_json().to_string()).await {
            return false;
        }
        *last_tps_send = now;
    }

    if is_new_block {
        // The history point itself is appended exactly once, from the
        // subscriber's own block-observation path (see `spawn_block_driver`
        // in lib.rs) — this tick only reads it back out, so N connected
        // clients never append N points for the same block.
        let history_message = WireMessage::new(topic::SUMMARY, key::TPS_HISTORY, json!(ctx.subscriber.tps_history()));
        if !sink.send_text(history_message.to_json().to_string()).await {
            return false;
        }

        info!(height, "broadcast tick observed new block");
        *last_seen_height = height;
    }

    true
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Forwards every transaction log the subscriber observes to all registered
/// clients. Runs as its own task, independent of any single client's tick.
pub async fn run_log_fanout(
    mut logs_rx: mpsc::Receiver<TransactionLog>,
    registry: Arc<ClientRegistry>,
    metrics: Arc<GatewayMetrics>,
) {
    while let Some(log) = logs_rx.recv().await {
        registry.broadcast_log(&log, &metrics).await;
    }
    warn!("transaction log channel closed, fan-out task exiting");
}
