//! Ingestion, fusion, and broadcast engine for the telemetry gateway.
//!
//! [`GatewayCore`] wires the three collectors, the consensus tracker, the
//! waterfall generator, the fused snapshot store, and the client registry
//! into a single runnable unit. It has no knowledge of HTTP or WebSocket
//! framing: the front door (a separate crate) drives it through
//! [`broadcast::ClientSink`] and the read accessors below.

pub mod broadcast;
pub mod collectors;
pub mod consensus_tracker;
pub mod error;
pub mod fused_store;
pub mod metrics;
pub mod registry;
pub mod waterfall;

use std::sync::Arc;

use gateway_config::GatewayConfig;
use gateway_types::fused::{ConsensusInfo, ExecutionInfo, FusedSnapshot, NetworkInfo};
use gateway_types::wire::TransactionLog;
use prometheus::Registry;
use tokio::sync::mpsc;
use tracing::info;

use collectors::{BlockSubscriber, IpcCollector, PrometheusCollector};
use consensus_tracker::ConsensusTracker;
use fused_store::FusedSnapshotStore;
use metrics::GatewayMetrics;
use registry::ClientRegistry;
use waterfall::WaterfallInputs;

pub const NETWORK_NAME: &str = "monad";

pub struct GatewayCore {
    pub config: GatewayConfig,
    pub prometheus: Arc<PrometheusCollector>,
    pub ipc: Arc<IpcCollector>,
    pub subscriber: Arc<BlockSubscriber>,
    pub consensus: Arc<ConsensusTracker>,
    pub store: Arc<FusedSnapshotStore>,
    pub registry: Arc<ClientRegistry>,
    pub metrics: Arc<GatewayMetrics>,
    pub gateway_registry: Registry,
}

impl GatewayCore {
    pub fn new(config: GatewayConfig) -> Self {
        let gateway_registry = Registry::new();
        let metrics = Arc::new(GatewayMetrics::new(&gateway_registry));

        let prometheus = Arc::new(PrometheusCollector::new(
            config.prometheus_endpoint.clone(),
            config.timings.scrape_timeout,
            config.timings.freshness_window,
        ));
        let ipc = Arc::new(IpcCollector::new(
            config.monad_ipc_path.clone(),
            config.timings.ipc_timeout,
            config.timings.ipc_freshness_window,
        ));
        let subscriber = Arc::new(BlockSubscriber::new(
            config.monad_ws_url.clone(),
            config.capacities.recent_blocks_window,
            config.capacities.tps_history_len,
            config.capacities.block_channel_buffer,
            config.capacities.logs_channel_buffer,
            config.timings.nominal_block_time,
            config.timings.reconnect_backoff,
        ));
        let consensus = Arc::new(ConsensusTracker::new(config.capacities.consensus_max_history));

        Self {
            config,
            prometheus,
            ipc,
            subscriber,
            consensus,
            store: Arc::new(FusedSnapshotStore::new()),
            registry: Arc::new(ClientRegistry::new()),
            metrics,
            gateway_registry,
        }
    }

    /// Spawns every long-lived task: the scrape tick, the IPC poll tick, the
    /// block subscription, the internal driver that advances the consensus
    /// tracker and republishes the fused snapshot on every enriched block,
    /// and the transaction-log fan-out task. Returns once all tasks are
    /// spawned; it does not block.
    pub async fn start(self: &Arc<Self>) {
        self.spawn_prometheus_tick();
        self.spawn_ipc_tick();
        self.subscriber.connect(Arc::clone(&self.metrics));
        self.spawn_block_driver().await;
        self.spawn_log_fanout().await;
    }

    fn spawn_prometheus_tick(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let period = this.config.timings.scrape_period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let _ = this.prometheus.tick(&this.metrics).await;
            }
        });
    }

    fn spawn_ipc_tick(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let period = this.config.timings.ipc_poll_period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let _ = this.ipc.tick(&this.metrics).await;
            }
        });
    }

    /// Consumes the subscriber's block channel: every enriched block drives
    /// the consensus tracker and republishes a fresh fused snapshot.
    async fn spawn_block_driver(self: &Arc<Self>) {
        let Some(mut block_rx) = self.subscriber.block_channel().await else {
            return;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(header) = block_rx.recv().await {
                this.consensus.on_block_proposed(header.number, header.hash.clone(), now_unix(), header.tx_count);

                // Appended exactly once per newly observed block, here on the
                // single block-observation path — not from the per-client
                // broadcast tick, which would append once per connected client.
                let one_second = this.subscriber.one_second_tps();
                let average = this.subscriber.average_tps();
                let instant = this.subscriber.instant_tps();
                this.subscriber.add_tps_to_history(one_second, average, instant, header.tx_count);

                this.republish_snapshot(&header);
            }
            info!("block channel closed, driver task exiting");
        });
    }

    async fn spawn_log_fanout(self: &Arc<Self>) {
        let Some(logs_rx) = self.subscriber.logs_channel().await else {
            return;
        };
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(broadcast::run_log_fanout(logs_rx, registry, metrics));
    }

    fn republish_snapshot(&self, header: &gateway_types::block::BlockHeader) {
        let waterfall = self.generate_waterfall(Some(header.number), Some(header.tx_count));
        let consensus_summary = self.consensus.consensus_state();

        let snapshot = FusedSnapshot {
            timestamp: header.timestamp,
            network: NetworkInfo { name: NETWORK_NAME.to_string(), version: env!("CARGO_PKG_VERSION").to_string() },
            consensus: ConsensusInfo {
                height: consensus_summary.current_block,
                time: header.timestamp,
                participation: participation_ratio(&consensus_summary),
            },
            execution: ExecutionInfo {
                tps: self.subscriber.one_second_tps(),
                pending_tx_count: waterfall.metadata.pending_tx_count,
                tracked_tx_count: waterfall.metadata.tracked_tx_count,
                gas_price: self.ipc.snapshot().execution.gas_price,
                parallel_success_rate: self.ipc.snapshot().execution.parallel_success_rate(),
                state_size: self.ipc.snapshot().execution.state_size,
            },
            waterfall,
        };
        self.store.publish(snapshot);
    }

    /// Builds a [`waterfall::WaterfallGraph`] from the current collector
    /// state. Exposed directly (not just through the snapshot store) so the
    /// legacy/v2 HTTP endpoints can serve a freshly computed graph even
    /// between block arrivals.
    pub fn generate_waterfall(&self, latest_block_number: Option<u64>, latest_block_tx_count: Option<u64>) -> gateway_types::waterfall::WaterfallGraph {
        let prometheus_snapshot = self.prometheus.snapshot();
        let ipc_snapshot = self.ipc.snapshot();
        let inputs = WaterfallInputs {
            prometheus_healthy: self.prometheus.is_healthy(),
            prometheus: &prometheus_snapshot,
            ipc_healthy: self.ipc.is_healthy(),
            ipc: &ipc_snapshot,
            subscriber_connected: self.subscriber.is_connected(),
            latest_block_tx_count: latest_block_tx_count.or_else(|| self.subscriber.latest_block().map(|b| b.tx_count)),
            latest_block_number: latest_block_number.or_else(|| self.subscriber.latest_block().map(|b| b.number)),
            consensus: self.consensus.consensus_state(),
        };
        waterfall::generate(&inputs)
    }

    pub fn broadcast_context(self: &Arc<Self>) -> Arc<broadcast::BroadcastContext> {
        Arc::new(broadcast::BroadcastContext {
            store: Arc::clone(&self.store),
            consensus: Arc::clone(&self.consensus),
            subscriber: Arc::clone(&self.subscriber),
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            tick: self.config.timings.broadcast_tick,
            tps_cadence: self.config.timings.tps_update_cadence,
            network_name: NETWORK_NAME.to_string(),
            network_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    pub async fn register_client(&self) -> (u64, mpsc::Receiver<TransactionLog>) {
        self.registry.register(self.config.capacities.logs_channel_buffer, &self.metrics).await
    }

    pub async fn deregister_client(&self, id: u64) {
        self.registry.deregister(id, &self.metrics).await;
    }
}

fn participation_ratio(summary: &gateway_types::consensus::ConsensusSummary) -> f64 {
    let total = summary.proposed_count + summary.voted_count + summary.finalized_count;
    if total == 0 {
        0.0
    } else {
        (summary.voted_count + summary.finalized_count) as f64 / total as f64
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
