use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gateway_types::block::BlockHeader;
use gateway_types::event_ring::EventRingStatus;
use gateway_types::tps::{TpsHistory, TpsHistoryPoint, TpsWindow};
use gateway_types::wire::TransactionLog;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CollectorError;
use crate::metrics::GatewayMetrics;

type WsWrite = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

/// `latest` answers direct header queries; `window` is the rolling
/// `(timestamp, tx_count)` buffer the three TPS definitions are derived
/// from.
struct SubscriberState {
    latest: Option<BlockHeader>,
    window: TpsWindow,
    tps_history: TpsHistory,
}

/// Maintains a live `eth_subscribe` connection to the upstream node,
/// enriches each header with its transaction count, and derives TPS.
pub struct BlockSubscriber {
    url: String,
    nominal_block_time: Duration,
    reconnect_backoff: Duration,
    state: RwLock<SubscriberState>,
    connected: AtomicBool,
    next_id: AtomicU64,
    pending: Arc<AsyncMutex<HashMap<u64, oneshot::Sender<Value>>>>,
    writer: Arc<AsyncMutex<Option<WsWrite>>>,
    block_tx: mpsc::Sender<BlockHeader>,
    block_rx: AsyncMutex<Option<mpsc::Receiver<BlockHeader>>>,
    logs_tx: mpsc::Sender<TransactionLog>,
    logs_rx: AsyncMutex<Option<mpsc::Receiver<TransactionLog>>>,
    cancel: CancellationToken,
    block_buffer_cap: usize,
    events_received: AtomicU64,
    bytes_received: AtomicU64,
    missed_events: AtomicU64,
    parse_errors: AtomicU64,
}

const SUB_NEW_HEADS: &str = "newHeads";
const SUB_MONAD_LOGS: &str = "monadLogs";

impl BlockSubscriber {
    pub fn new(
        url: String,
        window_cap: usize,
        history_cap: usize,
        block_buffer: usize,
        logs_buffer: usize,
        nominal_block_time: Duration,
        reconnect_backoff: Duration,
    ) -> Self {
        let (block_tx, block_rx) = mpsc::channel(block_buffer);
        let (logs_tx, logs_rx) = mpsc::channel(logs_buffer);
        Self {
            url,
            nominal_block_time,
            reconnect_backoff,
            state: RwLock::new(SubscriberState {
                latest: None,
                window: TpsWindow::new(window_cap),
                tps_history: TpsHistory::new(history_cap),
            }),
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            pending: Arc::new(AsyncMutex::new(HashMap::new())),
            writer: Arc::new(AsyncMutex::new(None)),
            block_tx,
            block_rx: AsyncMutex::new(Some(block_rx)),
            logs_tx,
            logs_rx: AsyncMutex::new(Some(logs_rx)),
            cancel: CancellationToken::new(),
            block_buffer_cap: block_buffer,
            events_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            missed_events: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
        }
    }

    /// Dials the upstream, runs the subscription handshake, and spawns the
    /// listener loop. On read failure the loop sleeps for the reconnect
    /// backoff and re-dials, re-running the handshake and adopting fresh
    /// subscription ids.
    pub fn connect(self: &Arc<Self>, metrics: Arc<GatewayMetrics>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if this.cancel.is_cancelled() {
                    return;
                }
                match this.run_once(&metrics).await {
                    Ok(()) => {}
                    Err(err) => {
                        warn!(url = %this.url, error = %err, "block subscription failed, reconnecting");
                    }
                }
                this.connected.store(false, Ordering::Relaxed);
                metrics.ws_reconnects_total.inc();

                tokio::select! {
                    _ = tokio::time::sleep(this.reconnect_backoff) => {}
                    _ = this.cancel.cancelled() => return,
                }
            }
        });
    }

    async fn run_once(self: &Arc<Self>, metrics: &Arc<GatewayMetrics>) -> Result<(), CollectorError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url).await.map_err(|source| {
            CollectorError::WsDial { url: self.url.clone(), source: Box::new(source) }
        })?;
        let (write, mut read) = ws_stream.split();
        *self.writer.lock().await = Some(write);
        self.connected.store(true, Ordering::Relaxed);
        info!(url = %self.url, "block subscriber connected");

        let heads_id = self.send_request("eth_subscribe", json!([SUB_NEW_HEADS])).await?;
        let logs_id = self.send_request("eth_subscribe", json!([SUB_MONAD_LOGS, {}])).await?;

        let heads_sub = self.await_subscription_id(heads_id).await?;
        let logs_sub = self.await_subscription_id(logs_id).await?;

        let mut sub_ids: HashMap<String, &'static str> = HashMap::new();
        sub_ids.insert(heads_sub, "heads");
        sub_ids.insert(logs_sub, "logs");

        loop {
            tokio::select! {
                frame = read.next() => {
                    let Some(frame) = frame else {
                        return Err(CollectorError::WsClosed { url: self.url.clone() });
                    };
                    let frame = frame.map_err(|source| CollectorError::WsDial {
                        url: self.url.clone(),
                        source: Box::new(source),
                    })?;
                    if let WsMessage::Text(text) = frame {
                        self.handle_frame(&text, &sub_ids, metrics).await;
                    }
                }
                _ = self.cancel.cancelled() => {
                    self.unsubscribe_best_effort(&sub_ids).await;
                    return Ok(());
                }
            }
        }
    }

    async fn handle_frame(&self, text: &str, sub_ids: &HashMap<String, &'static str>, metrics: &GatewayMetrics) {
        self.bytes_received.fetch_add(text.len() as u64, Ordering::Relaxed);

        let Ok(value) = serde_json::from_str::<Value>(text) else {
            self.parse_errors.fetch_add(1, Ordering::Relaxed);
            debug!("dropping non-json frame from block subscription");
            return;
        };

        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            let mut pending = self.pending.lock().await;
            if let Some(tx) = pending.remove(&id) {
                let _ = tx.send(value);
            }
            return;
        }

        if value.get("method").and_then(Value::as_str) != Some("eth_subscription") {
            return;
        }

        let Some(params) = value.get("params") else { return };
        let Some(sub_id) = params.get("subscription").and_then(Value::as_str) else { return };
        let Some(kind) = sub_ids.get(sub_id) else {
            metrics.unrouted_frames_total.inc();
            self.missed_events.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let Some(result) = params.get("result") else { return };

        self.events_received.fetch_add(1, Ordering::Relaxed);
        match *kind {
            "heads" => self.on_new_head(result, metrics).await,
            "logs" => self.on_log(result, metrics).await,
            _ => {}
        }
    }

    async fn on_new_head(&self, payload: &Value, metrics: &GatewayMetrics) {
        let Some(header) = parse_header(payload) else {
            warn!("could not parse newHeads payload, skipping");
            return;
        };

        match self.enrich(header.clone()).await {
            Ok(enriched) => {
                {
                    let mut state = self.state.write();
                    state.window.push(enriched.timestamp, enriched.tx_count);
                    state.latest = Some(enriched.clone());
                }
                if self.block_tx.try_send(enriched).is_err() {
                    metrics.record_channel_drop("block");
                }
            }
            Err(err) => {
                warn!(number = header.number, error = %err, "block enrichment failed, header discarded");
            }
        }
    }

    async fn on_log(&self, payload: &Value, metrics: &GatewayMetrics) {
        let Ok(log) = serde_json::from_value::<TransactionLog>(payload.clone()) else {
            debug!("malformed transaction log payload");
            return;
        };
        if self.logs_tx.try_send(log).is_err() {
            metrics.record_channel_drop("logs");
        }
    }

    async fn enrich(&self, mut header: BlockHeader) -> Result<BlockHeader, CollectorError> {
        let hex_number = format!("0x{:x}", header.number);
        let id = self.send_request("eth_getBlockByNumber", json!([hex_number, false])).await?;
        let reply = self.await_reply(id).await?;
        let tx_count = reply
            .get("result")
            .and_then(|r| r.get("transactions"))
            .and_then(Value::as_array)
            .map(|txs| txs.len() as u64)
            .unwrap_or(0);
        header.enrich(tx_count);
        Ok(header)
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<u64, CollectorError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(CollectorError::WsClosed { url: self.url.clone() });
        };
        writer
            .send(WsMessage::Text(request.to_string()))
            .await
            .map_err(|source| CollectorError::WsDial { url: self.url.clone(), source: Box::new(source) })?;
        Ok(id)
    }

    async fn await_reply(&self, id: u64) -> Result<Value, CollectorError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        rx.await.map_err(|_| CollectorError::WsClosed { url: self.url.clone() })
    }

    async fn await_subscription_id(&self, id: u64) -> Result<String, CollectorError> {
        let reply = self.await_reply(id).await?;
        reply
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CollectorError::Malformed {
                source_name: "block_subscriber",
                reason: "eth_subscribe reply had no subscription id".to_string(),
            })
    }

    async fn unsubscribe_best_effort(&self, sub_ids: &HashMap<String, &'static str>) {
        for sub_id in sub_ids.keys() {
            let _ = self.send_request("eth_unsubscribe", json!([sub_id])).await;
        }
    }

    pub fn latest_block(&self) -> Option<BlockHeader> {
        self.state.read().latest.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub async fn block_channel(&self) -> Option<mpsc::Receiver<BlockHeader>> {
        self.block_rx.lock().await.take()
    }

    pub async fn logs_channel(&self) -> Option<mpsc::Receiver<TransactionLog>> {
        self.logs_rx.lock().await.take()
    }

    pub fn instant_tps(&self) -> f64 {
        let state = self.state.read();
        match state.window.latest() {
            Some((_, tx_count)) => tx_count as f64 / self.nominal_block_time.as_secs_f64(),
            None => 0.0,
        }
    }

    pub fn average_tps(&self) -> f64 {
        let state = self.state.read();
        if state.window.len() < 2 {
            return 0.0;
        }
        let (first_ts, _) = state.window.oldest().unwrap();
        let (last_ts, _) = state.window.latest().unwrap();
        let total_tx: u64 = state.window.iter().copied().map(|(_, tx_count)| tx_count).sum();
        let delta = last_ts.saturating_sub(first_ts);
        if delta > 0 {
            total_tx as f64 / delta as f64
        } else {
            let fallback = (state.window.len() - 1) as f64 * self.nominal_block_time.as_secs_f64();
            if fallback > 0.0 {
                total_tx as f64 / fallback
            } else {
                0.0
            }
        }
    }

    pub fn one_second_tps(&self) -> f64 {
        let state = self.state.read();
        let Some((last_ts, _)) = state.window.latest() else { return 0.0 };
        let cutoff = last_ts.saturating_sub(1);
        state.window.iter().copied().filter(|(ts, _)| *ts >= cutoff).map(|(_, tx_count)| tx_count).sum::<u64>() as f64
    }

    pub fn add_tps_to_history(&self, one_second: f64, average: f64, instant: f64, tx_count: u64) {
        let mut state = self.state.write();
        state.tps_history.push(TpsHistoryPoint {
            one_second_tps: one_second,
            vote_tps: 0.0,
            average_tps: average,
            instant_tps: instant,
            tx_count,
        });
    }

    pub fn tps_history(&self) -> Vec<TpsHistoryPoint> {
        self.state.read().tps_history.snapshot()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Status bag for the legacy `/api/v1/event-rings` surface, backed by
    /// this subscriber's own frame counters rather than a real ring buffer.
    pub fn event_ring_status(&self) -> EventRingStatus {
        EventRingStatus {
            connected: self.is_connected(),
            events_received: self.events_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            missed_events: self.missed_events.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            last_sequence: self.events_received.load(Ordering::Relaxed),
            buffer_size: self.block_buffer_cap,
        }
    }
}

/// Decodes `number`, `timestamp`, `gasUsed` as hex uint64, `hash` as a
/// string, and `transactionCount` from the length of an embedded
/// `transactions` array when present (the `newHeads` stream usually omits
/// it, which is why enrichment exists).
fn parse_header(payload: &Value) -> Option<BlockHeader> {
    let number = hex_u64(payload.get("number")?.as_str()?)?;
    let hash = payload.get("hash")?.as_str()?.to_string();
    let timestamp = hex_u64(payload.get("timestamp")?.as_str()?)?;
    let gas_used = payload.get("gasUsed").and_then(Value::as_str).and_then(hex_u64).unwrap_or(0);

    let mut header = BlockHeader::new(number, hash, timestamp, gas_used);
    if let Some(txs) = payload.get("transactions").and_then(Value::as_array) {
        header.enrich(txs.len() as u64);
    }
    Some(header)
}

fn hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_encoded_header_fields() {
        let payload = json!({
            "number": "0x2a",
            "hash": "0xabc123",
            "timestamp": "0x64",
            "gasUsed": "0x5208",
        });
        let header = parse_header(&payload).unwrap();
        assert_eq!(header.number, 42);
        assert_eq!(header.timestamp, 100);
        assert_eq!(header.gas_used, 0x5208);
        assert_eq!(header.tx_count, 0);
    }

    #[test]
    fn missing_required_field_yields_none() {
        let payload = json!({ "hash": "0xabc" });
        assert!(parse_header(&payload).is_none());
    }

    #[test]
    fn transactions_array_in_payload_sets_tx_count_directly() {
        let payload = json!({
            "number": "0x1",
            "hash": "0xabc",
            "timestamp": "0x1",
            "transactions": ["0x1", "0x2", "0x3"],
        });
        let header = parse_header(&payload).unwrap();
        assert_eq!(header.tx_count, 3);
    }
}
