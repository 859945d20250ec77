use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Registry,
};

/// Self-observability counters for the gateway itself, bound to a private
/// [`Registry`] (never the process-default one) the same way the upstream
/// node binds its authority metrics: constructed once at startup and handed
/// down to every collector that needs to bump a counter.
pub struct GatewayMetrics {
    pub scrape_attempts_total: IntCounterVec,
    pub scrape_failures_total: IntCounterVec,
    pub ws_reconnects_total: IntCounter,
    pub unrouted_frames_total: IntCounter,
    pub channel_drops_total: IntCounterVec,
    pub connected_clients: IntGauge,
    pub broadcast_write_failures_total: IntCounter,
}

impl GatewayMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            scrape_attempts_total: register_int_counter_vec_with_registry!(
                "gateway_scrape_attempts_total",
                "Number of scrape/poll attempts per upstream source",
                &["source"],
                registry,
            )
            .unwrap(),
            scrape_failures_total: register_int_counter_vec_with_registry!(
                "gateway_scrape_failures_total",
                "Number of failed scrape/poll attempts per upstream source",
                &["source"],
                registry,
            )
            .unwrap(),
            ws_reconnects_total: register_int_counter_with_registry!(
                "gateway_ws_reconnects_total",
                "Number of times the block subscription websocket has reconnected",
                registry,
            )
            .unwrap(),
            unrouted_frames_total: register_int_counter_with_registry!(
                "gateway_unrouted_frames_total",
                "Number of inbound subscription frames with no matching subscription id",
                registry,
            )
            .unwrap(),
            channel_drops_total: register_int_counter_vec_with_registry!(
                "gateway_channel_drops_total",
                "Number of messages dropped because a bounded channel was full",
                &["channel"],
                registry,
            )
            .unwrap(),
            connected_clients: register_int_gauge_with_registry!(
                "gateway_connected_clients",
                "Number of currently connected websocket clients",
                registry,
            )
            .unwrap(),
            broadcast_write_failures_total: register_int_counter_with_registry!(
                "gateway_broadcast_write_failures_total",
                "Number of per-client websocket writes that failed and evicted the client",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn record_scrape_attempt(&self, source: &str) {
        self.scrape_attempts_total.with_label_values(&[source]).inc();
    }

    pub fn record_scrape_failure(&self, source: &str) {
        self.scrape_failures_total.with_label_values(&[source]).inc();
    }

    pub fn record_channel_drop(&self, channel: &str) {
        self.channel_drops_total.with_label_values(&[channel]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let registry = Registry::new();
        let metrics = GatewayMetrics::new(&registry);

        metrics.record_scrape_attempt("prometheus");
        metrics.record_scrape_attempt("prometheus");
        metrics.record_scrape_failure("ipc");

        assert_eq!(metrics.scrape_attempts_total.with_label_values(&["prometheus"]).get(), 2);
        assert_eq!(metrics.scrape_failures_total.with_label_values(&["ipc"]).get(), 1);
        assert_eq!(metrics.ws_reconnects_total.get(), 0);
    }
}
