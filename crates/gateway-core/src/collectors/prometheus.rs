use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gateway_types::snapshot::{PrometheusCounters, PrometheusRates, PrometheusSnapshot};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::CollectorError;
use crate::metrics::GatewayMetrics;

const METRIC_TX_COMMITS: &str = "monad_txpool_commits_total";
const METRIC_INSERT_OWNED: &str = "monad_txpool_insert_owned_total";
const METRIC_INSERT_FORWARDED: &str = "monad_txpool_insert_forwarded_total";
const METRIC_DROP_INVALID_SIGNATURE: &str = "monad_txpool_drop_invalid_signature_total";
const METRIC_DROP_NONCE_INVALID: &str = "monad_txpool_drop_nonce_invalid_total";
const METRIC_DROP_INSUFFICIENT_BALANCE: &str = "monad_txpool_drop_insufficient_balance_total";
const METRIC_DROP_BLOCK_FULL: &str = "monad_txpool_drop_block_full_total";
const METRIC_DROP_FEE_TOO_LOW: &str = "monad_txpool_drop_fee_too_low_total";
const METRIC_PENDING: &str = "monad_txpool_pending_txs";
const METRIC_TRACKED: &str = "monad_txpool_tracked_txs";

/// Periodically scrapes a Prometheus text-format endpoint and maintains the
/// latest counters plus the rates derived from the previous sample.
///
/// All state lives behind a single [`RwLock`] so `snapshot()` readers never
/// block a scrape in progress for longer than the pointer swap itself.
pub struct PrometheusCollector {
    endpoint: String,
    timeout: Duration,
    freshness_window: Duration,
    http: reqwest::Client,
    state: RwLock<PrometheusSnapshot>,
    last_success_unix: AtomicU64,
}

impl PrometheusCollector {
    pub fn new(endpoint: String, timeout: Duration, freshness_window: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            freshness_window,
            http: reqwest::Client::new(),
            state: RwLock::new(PrometheusSnapshot::default()),
            last_success_unix: AtomicU64::new(0),
        }
    }

    /// Runs one scrape/parse/rate-derivation cycle. Never returns `Err` to
    /// the caller for anything downstream of "could not fetch the document":
    /// parse failures for individual lines are absorbed silently per the
    /// scrape algorithm, only transport/status failures are reported so the
    /// caller can bump the self-observability counters.
    pub async fn tick(&self, metrics: &GatewayMetrics) -> Result<(), CollectorError> {
        metrics.record_scrape_attempt("prometheus");
        match self.scrape_once().await {
            Ok(()) => Ok(()),
            Err(err) => {
                metrics.record_scrape_failure("prometheus");
                warn!(endpoint = %self.endpoint, error = %err, "prometheus scrape failed, keeping previous snapshot");
                Err(err)
            }
        }
    }

    async fn scrape_once(&self) -> Result<(), CollectorError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| CollectorError::Http { endpoint: self.endpoint.clone(), source })?;

        if !resp.status().is_success() {
            return Err(CollectorError::BadStatus {
                endpoint: self.endpoint.clone(),
                status: resp.status().as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|source| CollectorError::Http { endpoint: self.endpoint.clone(), source })?;

        let counters = parse_text_format(&body);
        let now = now_unix();

        let mut guard = self.state.write();
        let previous = *guard;
        let rates = derive_rates(&previous, &counters, now);
        *guard = PrometheusSnapshot { counters, rates, timestamp: now };
        drop(guard);

        self.last_success_unix.store(now, Ordering::Relaxed);
        Ok(())
    }

    pub fn snapshot(&self) -> PrometheusSnapshot {
        *self.state.read()
    }

    pub fn is_healthy(&self) -> bool {
        let last = self.last_success_unix.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        now_unix().saturating_sub(last) <= self.freshness_window.as_secs()
    }

    pub fn tps(&self) -> f64 {
        self.state.read().rates.tx_commits_rate
    }
}

/// Parses a Prometheus text-format document into the closed set of counters
/// this gateway understands. Unknown metric names and unparseable values are
/// skipped line by line; the last line wins when a name repeats.
fn parse_text_format(body: &str) -> PrometheusCounters {
    let mut counters = PrometheusCounters::default();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(name_and_labels) = tokens.next() else { continue };
        let Some(value_token) = tokens.next() else { continue };

        let name = match name_and_labels.split_once('{') {
            Some((n, _)) => n,
            None => name_and_labels,
        };

        let Ok(value) = value_token.parse::<f64>() else { continue };
        let value = value.max(0.0) as u64;

        match name {
            METRIC_TX_COMMITS => counters.tx_commits_total = value,
            METRIC_INSERT_OWNED => counters.insert_owned_total = value,
            METRIC_INSERT_FORWARDED => counters.insert_forwarded_total = value,
            METRIC_DROP_INVALID_SIGNATURE => counters.drop_invalid_signature_total = value,
            METRIC_DROP_NONCE_INVALID => counters.drop_nonce_invalid_total = value,
            METRIC_DROP_INSUFFICIENT_BALANCE => counters.drop_insufficient_balance_total = value,
            METRIC_DROP_BLOCK_FULL => counters.drop_block_full_total = value,
            METRIC_DROP_FEE_TOO_LOW => counters.drop_fee_too_low_total = value,
            METRIC_PENDING => counters.pending_tx_count = value,
            METRIC_TRACKED => counters.tracked_tx_count = value,
            other => {
                debug!(metric = other, "ignoring unrecognized prometheus metric");
            }
        }
    }

    counters
}

/// Rate = (new - old) / delta for each cumulative counter, or zero whenever
/// the delta is non-positive or there is no prior sample. Guards against
/// counter resets by clamping a negative numerator to zero rather than
/// emitting a negative rate.
fn derive_rates(previous: &PrometheusSnapshot, current: &PrometheusCounters, now: u64) -> PrometheusRates {
    let delta = now.saturating_sub(previous.timestamp);
    if previous.timestamp == 0 || delta == 0 {
        return PrometheusRates::default();
    }
    let dt = delta as f64;

    let rate = |prev: u64, cur: u64| -> f64 {
        if cur <= prev {
            0.0
        } else {
            (cur - prev) as f64 / dt
        }
    };

    let tx_commits_rate = rate(previous.counters.tx_commits_total, current.tx_commits_total);
    PrometheusRates {
        tx_commits_rate,
        insert_owned_rate: rate(previous.counters.insert_owned_total, current.insert_owned_total),
        insert_forwarded_rate: rate(previous.counters.insert_forwarded_total, current.insert_forwarded_total),
        drop_invalid_signature_rate: rate(
            previous.counters.drop_invalid_signature_total,
            current.drop_invalid_signature_total,
        ),
        drop_nonce_invalid_rate: rate(previous.counters.drop_nonce_invalid_total, current.drop_nonce_invalid_total),
        drop_insufficient_balance_rate: rate(
            previous.counters.drop_insufficient_balance_total,
            current.drop_insufficient_balance_total,
        ),
        drop_block_full_rate: rate(previous.counters.drop_block_full_total, current.drop_block_full_total),
        drop_fee_too_low_rate: rate(previous.counters.drop_fee_too_low_total, current.drop_fee_too_low_total),
        tps: tx_commits_rate,
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

    const SAMPLE_DOC: &str = r#"
# HELP monad_txpool_commits_total total committed transactions
# TYPE monad_txpool_commits_total counter
monad_txpool_commits_total{chain="monad"} 150
monad_txpool_insert_owned_total 20
monad_txpool_insert_forwarded_total 5
monad_txpool_pending_txs 42
monad_txpool_tracked_txs 99
some_unrelated_metric 1234
"#;

    #[test]
    fn parses_known_metrics_and_ignores_unknown() {
        let counters = parse_text_format(SAMPLE_DOC);
        assert_eq!(counters.tx_commits_total, 150);
        assert_eq!(counters.insert_owned_total, 20);
        assert_eq!(counters.insert_forwarded_total, 5);
        assert_eq!(counters.pending_tx_count, 42);
        assert_eq!(counters.tracked_tx_count, 99);
    }

    #[test]
    fn rate_is_zero_on_first_sample() {
        let previous = PrometheusSnapshot::default();
        let current = PrometheusCounters { tx_commits_total: 100, ..Default::default() };
        let rates = derive_rates(&previous, &current, 1_000);
        assert_eq!(rates.tx_commits_rate, 0.0);
        assert_eq!(rates.tps, 0.0);
    }

    #[test]
    fn rate_is_zero_on_nonpositive_delta() {
        let previous = PrometheusSnapshot { timestamp: 1_000, ..Default::default() };
        let current = PrometheusCounters { tx_commits_total: 100, ..Default::default() };
        let rates = derive_rates(&previous, &current, 1_000);
        assert_eq!(rates.tx_commits_rate, 0.0);
    }

    #[test]
    fn counter_reset_clamps_to_zero_not_negative() {
        let previous = PrometheusSnapshot {
            counters: PrometheusCounters { tx_commits_total: 500, ..Default::default() },
            timestamp: 1_000,
            ..Default::default()
        };
        let current = PrometheusCounters { tx_commits_total: 10, ..Default::default() };
        let rates = derive_rates(&previous, &current, 1_005);
        assert_eq!(rates.tx_commits_rate, 0.0);
    }

    #[test]
    fn normal_delta_computes_expected_rate() {
        let previous = PrometheusSnapshot {
            counters: PrometheusCounters { tx_commits_total: 100, ..Default::default() },
            timestamp: 1_000,
            ..Default::default()
        };
        let current = PrometheusCounters { tx_commits_total: 150, ..Default::default() };
        let rates = derive_rates(&previous, &current, 1_005);
        assert_eq!(rates.tx_commits_rate, 10.0);
        assert_eq!(rates.tps, 10.0);
    }
}
