use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gateway_types::snapshot::{IpcExecutionMetrics, IpcSnapshot, IpcTxPoolMetrics};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::warn;

use crate::error::CollectorError;
use crate::metrics::GatewayMetrics;

/// Polls a local Unix-domain socket for a point-in-time metrics snapshot.
/// A fresh connection is opened per poll: the counterparty may close its
/// side unpredictably, and short-lived connections sidestep broken-pipe
/// handling entirely.
pub struct IpcCollector {
    socket_path: String,
    timeout: Duration,
    freshness_window: Duration,
    state: RwLock<IpcSnapshot>,
    last_success_unix: AtomicU64,
}

#[derive(Deserialize)]
struct IpcReply {
    result: Option<IpcResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpcResult {
    pending_tx_count: u64,
    tracked_tx_count: u64,
    insert_owned_total: u64,
    insert_forwarded_total: u64,
    drop_invalid_signature_total: u64,
    drop_nonce_invalid_total: u64,
    drop_insufficient_balance_total: u64,
    drop_block_full_total: u64,
    drop_fee_too_low_total: u64,
    tps: f64,
    parallel_success: u64,
    sequential_fallback: u64,
    state_reads: u64,
    state_writes: u64,
    gas_price: u64,
    state_size: u64,
}

impl IpcCollector {
    pub fn new(socket_path: String, timeout: Duration, freshness_window: Duration) -> Self {
        Self {
            socket_path,
            timeout,
            freshness_window,
            state: RwLock::new(IpcSnapshot::default()),
            last_success_unix: AtomicU64::new(0),
        }
    }

    pub async fn tick(&self, metrics: &GatewayMetrics) -> Result<(), CollectorError> {
        metrics.record_scrape_attempt("ipc");
        match self.poll_once().await {
            Ok(()) => Ok(()),
            Err(err) => {
                metrics.record_scrape_failure("ipc");
                warn!(path = %self.socket_path, error = %err, "ipc poll failed, keeping previous snapshot");
                Err(err)
            }
        }
    }

    async fn poll_once(&self) -> Result<(), CollectorError> {
        let mut stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| CollectorError::IpcTimeout { path: self.socket_path.clone() })?
            .map_err(|source| CollectorError::IpcDial { path: self.socket_path.clone(), source })?;

        let request = json!({ "jsonrpc": "2.0", "id": 1, "method": "monad_getMetrics", "params": [] });
        let payload = request.to_string();

        tokio::time::timeout(self.timeout, stream.write_all(payload.as_bytes()))
            .await
            .map_err(|_| CollectorError::IpcTimeout { path: self.socket_path.clone() })?
            .map_err(|source| CollectorError::IpcDial { path: self.socket_path.clone(), source })?;
        tokio::time::timeout(self.timeout, stream.shutdown())
            .await
            .map_err(|_| CollectorError::IpcTimeout { path: self.socket_path.clone() })?
            .ok();

        let mut buf = Vec::new();
        tokio::time::timeout(self.timeout, stream.read_to_end(&mut buf))
            .await
            .map_err(|_| CollectorError::IpcTimeout { path: self.socket_path.clone() })?
            .map_err(|source| CollectorError::IpcDial { path: self.socket_path.clone(), source })?;

        let reply: IpcReply = serde_json::from_slice(&buf).map_err(|e| CollectorError::Malformed {
            source_name: "ipc",
            reason: e.to_string(),
        })?;
        let result = reply.result.ok_or_else(|| CollectorError::Malformed {
            source_name: "ipc",
            reason: "missing result field".to_string(),
        })?;

        let now = now_unix();
        let snapshot = IpcSnapshot {
            txpool: IpcTxPoolMetrics {
                pending_tx_count: result.pending_tx_count,
                tracked_tx_count: result.tracked_tx_count,
                insert_owned_total: result.insert_owned_total,
                insert_forwarded_total: result.insert_forwarded_total,
                drop_invalid_signature_total: result.drop_invalid_signature_total,
                drop_nonce_invalid_total: result.drop_nonce_invalid_total,
                drop_insufficient_balance_total: result.drop_insufficient_balance_total,
                drop_block_full_total: result.drop_block_full_total,
                drop_fee_too_low_total: result.drop_fee_too_low_total,
                tps: result.tps,
            },
            execution: IpcExecutionMetrics {
                parallel_success: result.parallel_success,
                sequential_fallback: result.sequential_fallback,
                state_reads: result.state_reads,
                state_writes: result.state_writes,
                gas_price: result.gas_price,
                state_size: result.state_size,
            },
            timestamp: now,
        };

        *self.state.write() = snapshot;
        self.last_success_unix.store(now, Ordering::Relaxed);
        Ok(())
    }

    pub fn snapshot(&self) -> IpcSnapshot {
        *self.state.read()
    }

    pub fn is_healthy(&self) -> bool {
        let last = self.last_success_unix.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        now_unix().saturating_sub(last) <= self.freshness_window.as_secs()
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_constructed_collector_is_unhealthy() {
        let collector = IpcCollector::new("/tmp/does-not-exist.sock".to_string(), Duration::from_secs(5), Duration::from_secs(5));
        assert!(!collector.is_healthy());
        assert_eq!(collector.snapshot().timestamp, 0);
    }
}
