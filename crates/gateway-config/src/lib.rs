//! Environment-variable configuration for the telemetry gateway.
//!
//! A command-line flag layer is explicitly out of scope: the only
//! configuration surface the core exposes is the handful of environment
//! variables documented here, loaded once at startup into a validated
//! [`GatewayConfig`].

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_PROMETHEUS_ENDPOINT: &str = "http://127.0.0.1:8889/metrics";
const DEFAULT_IPC_SOCKET_NAME: &str = "monad-bft/mempool.sock";
const DEFAULT_MONAD_WS_URL: &str = "ws://127.0.0.1:8546";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9090";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is set but not valid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Fixed intervals the gateway runs its collectors and broadcast loop at.
/// These are not environment-tunable: they are part of the observed
/// behavior the test suite pins down.
#[derive(Clone, Copy, Debug)]
pub struct Timings {
    pub scrape_period: Duration,
    pub scrape_timeout: Duration,
    pub ipc_poll_period: Duration,
    pub ipc_timeout: Duration,
    pub broadcast_tick: Duration,
    pub tps_update_cadence: Duration,
    pub freshness_window: Duration,
    pub ipc_freshness_window: Duration,
    pub reconnect_backoff: Duration,
    pub nominal_block_time: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            scrape_period: Duration::from_secs(5),
            scrape_timeout: Duration::from_secs(5),
            ipc_poll_period: Duration::from_secs(1),
            ipc_timeout: Duration::from_secs(5),
            broadcast_tick: Duration::from_millis(200),
            tps_update_cadence: Duration::from_secs(1),
            freshness_window: Duration::from_secs(10),
            ipc_freshness_window: Duration::from_secs(5),
            reconnect_backoff: Duration::from_secs(2),
            nominal_block_time: Duration::from_millis(400),
        }
    }
}

/// Resource caps: recent-blocks window, TPS history length, consensus
/// history depth, and the non-blocking channel buffer sizes.
#[derive(Clone, Copy, Debug)]
pub struct Capacities {
    pub recent_blocks_window: usize,
    pub tps_history_len: usize,
    pub consensus_max_history: u64,
    pub block_channel_buffer: usize,
    pub logs_channel_buffer: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            recent_blocks_window: 10,
            tps_history_len: 200,
            consensus_max_history: 20,
            block_channel_buffer: 100,
            logs_channel_buffer: 1000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub prometheus_endpoint: String,
    pub monad_ipc_path: String,
    pub monad_ws_url: String,
    pub bind_addr: SocketAddr,
    pub timings: Timings,
    pub capacities: Capacities,
}

impl GatewayConfig {
    /// Loads configuration from the environment, applying the defaults
    /// declared above when a variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let prometheus_endpoint = std::env::var("PROMETHEUS_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_PROMETHEUS_ENDPOINT.to_string());
        if !prometheus_endpoint.starts_with("http://") && !prometheus_endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "PROMETHEUS_ENDPOINT",
                reason: "must be an http(s) URL".to_string(),
            });
        }

        let monad_ipc_path =
            std::env::var("MONAD_IPC_PATH").unwrap_or_else(|_| default_ipc_path());

        let monad_ws_url =
            std::env::var("MONAD_WS_URL").unwrap_or_else(|_| DEFAULT_MONAD_WS_URL.to_string());
        if !monad_ws_url.starts_with("ws://") && !monad_ws_url.starts_with("wss://") {
            return Err(ConfigError::Invalid {
                var: "MONAD_WS_URL",
                reason: "must be a ws(s) URL".to_string(),
            });
        }

        let bind_addr_raw =
            std::env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            var: "GATEWAY_BIND_ADDR",
            reason: e.to_string(),
        })?;

        Ok(Self {
            prometheus_endpoint,
            monad_ipc_path,
            monad_ws_url,
            bind_addr,
            timings: Timings::default(),
            capacities: Capacities::default(),
        })
    }
}

fn default_ipc_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
    format!("{home}/{DEFAULT_IPC_SOCKET_NAME}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_prometheus_endpoint() {
        std::env::set_var("PROMETHEUS_ENDPOINT", "ftp://example.com/metrics");
        std::env::remove_var("MONAD_WS_URL");
        std::env::remove_var("GATEWAY_BIND_ADDR");

        let err = GatewayConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PROMETHEUS_ENDPOINT", .. }));

        std::env::remove_var("PROMETHEUS_ENDPOINT");
    }

    #[test]
    fn defaults_apply_when_unset() {
        std::env::remove_var("PROMETHEUS_ENDPOINT");
        std::env::remove_var("MONAD_IPC_PATH");
        std::env::remove_var("MONAD_WS_URL");
        std::env::remove_var("GATEWAY_BIND_ADDR");

        let cfg = GatewayConfig::from_env().unwrap();
        assert_eq!(cfg.prometheus_endpoint, DEFAULT_PROMETHEUS_ENDPOINT);
        assert!(cfg.monad_ipc_path.ends_with(DEFAULT_IPC_SOCKET_NAME));
        assert_eq!(cfg.bind_addr.port(), 9090);
    }
}
