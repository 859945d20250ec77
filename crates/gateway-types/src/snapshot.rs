use serde::{Deserialize, Serialize};

/// Cumulative counters scraped from the Prometheus text-format endpoint.
/// Meaningful only as a diff between two successive scrapes; a single
/// sample cannot be read as a rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrometheusCounters {
    pub tx_commits_total: u64,
    pub insert_owned_total: u64,
    pub insert_forwarded_total: u64,
    pub drop_invalid_signature_total: u64,
    pub drop_nonce_invalid_total: u64,
    pub drop_insufficient_balance_total: u64,
    pub drop_block_full_total: u64,
    pub drop_fee_too_low_total: u64,
    pub pending_tx_count: u64,
    pub tracked_tx_count: u64,
}

/// Per-second rates derived from two successive [`PrometheusCounters`]
/// samples. Zero (never negative, never NaN) whenever the sampling delta
/// cannot produce a meaningful rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrometheusRates {
    pub tx_commits_rate: f64,
    pub insert_owned_rate: f64,
    pub insert_forwarded_rate: f64,
    pub drop_invalid_signature_rate: f64,
    pub drop_nonce_invalid_rate: f64,
    pub drop_insufficient_balance_rate: f64,
    pub drop_block_full_rate: f64,
    pub drop_fee_too_low_rate: f64,
    pub tps: f64,
}

/// One successful scrape of the upstream Prometheus endpoint, overwritten
/// in place by the collector on each successful poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrometheusSnapshot {
    pub counters: PrometheusCounters,
    pub rates: PrometheusRates,
    /// Unix-seconds wall-clock time the scrape completed.
    pub timestamp: u64,
}

impl PrometheusSnapshot {
    pub fn at(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }
}

/// Transaction-pool side of an IPC `monad_getMetrics` reply. Unlike the
/// Prometheus counters these are already point-in-time values reported by
/// the upstream, so no rate derivation is needed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IpcTxPoolMetrics {
    pub pending_tx_count: u64,
    pub tracked_tx_count: u64,
    pub insert_owned_total: u64,
    pub insert_forwarded_total: u64,
    pub drop_invalid_signature_total: u64,
    pub drop_nonce_invalid_total: u64,
    pub drop_insufficient_balance_total: u64,
    pub drop_block_full_total: u64,
    pub drop_fee_too_low_total: u64,
    pub tps: f64,
}

/// Execution-layer counters the Prometheus endpoint does not expose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IpcExecutionMetrics {
    pub parallel_success: u64,
    pub sequential_fallback: u64,
    pub state_reads: u64,
    pub state_writes: u64,
    pub gas_price: u64,
    pub state_size: u64,
}

impl IpcExecutionMetrics {
    /// Fraction of transactions that executed on the parallel path rather
    /// than falling back to sequential execution. Zero when nothing has
    /// executed yet.
    pub fn parallel_success_rate(&self) -> f64 {
        let total = self.parallel_success + self.sequential_fallback;
        if total == 0 {
            0.0
        } else {
            self.parallel_success as f64 / total as f64
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IpcSnapshot {
    pub txpool: IpcTxPoolMetrics,
    pub execution: IpcExecutionMetrics,
    pub timestamp: u64,
}

impl IpcSnapshot {
    pub fn at(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }
}
