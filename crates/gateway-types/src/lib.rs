//! Data model shared by every crate in the telemetry gateway.
//!
//! This crate has no I/O of its own: it only carries the value types that
//! collectors produce, the consensus tracker mutates, and the broadcast loop
//! serializes onto the wire. Keeping it free of `tokio`/`reqwest`/`axum`
//! means it can be unit-tested in isolation and reused by both `gateway-core`
//! and `gateway-node`.

pub mod block;
pub mod consensus;
pub mod event_ring;
pub mod fused;
pub mod snapshot;
pub mod tps;
pub mod waterfall;
pub mod wire;

pub use block::BlockHeader;
pub use consensus::{BlockConsensusState, BlockPhase, ConsensusSummary};
pub use event_ring::EventRingStatus;
pub use fused::{ConsensusInfo, ExecutionInfo, FusedSnapshot, NetworkInfo};
pub use snapshot::{IpcExecutionMetrics, IpcSnapshot, IpcTxPoolMetrics, PrometheusSnapshot};
pub use tps::{TpsHistoryPoint, TpsWindow};
pub use waterfall::{SourceTag, WaterfallGraph, WaterfallLink, WaterfallMetadata, WaterfallNode};
pub use wire::{ClientMessage, TransactionLog, WireMessage};
