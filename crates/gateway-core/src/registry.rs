use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use gateway_types::wire::TransactionLog;
use tokio::sync::{mpsc, RwLock};

use crate::metrics::GatewayMetrics;

/// A registered client's inbox for messages that originate outside its own
/// per-tick composition loop (currently: transaction-log fan-out).
pub struct ClientHandle {
    pub id: u64,
    logs_tx: mpsc::Sender<TransactionLog>,
}

/// Set-of-connections registry. Registration happens on WebSocket upgrade,
/// de-registration on disconnect; broadcast fan-out iterates under the read
/// lock and never removes an entry itself (a client that failed its own
/// write observes that on its next tick and deregisters).
pub struct ClientRegistry {
    clients: RwLock<HashMap<u64, ClientHandle>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self { clients: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    pub async fn register(&self, logs_buffer: usize, metrics: &GatewayMetrics) -> (u64, mpsc::Receiver<TransactionLog>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (logs_tx, logs_rx) = mpsc::channel(logs_buffer);
        self.clients.write().await.insert(id, ClientHandle { id, logs_tx });
        metrics.connected_clients.inc();
        (id, logs_rx)
    }

    pub async fn deregister(&self, id: u64, metrics: &GatewayMetrics) {
        if self.clients.write().await.remove(&id).is_some() {
            metrics.connected_clients.dec();
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Fans a transaction log out to every registered client's inbox.
    /// Per-client send failures (full buffer, closed receiver) are counted
    /// but never mutate the registry; the owning client task will discover
    /// a closed receiver on its own next write and deregister itself.
    pub async fn broadcast_log(&self, log: &TransactionLog, metrics: &GatewayMetrics) {
        let clients = self.clients.read().await;
        for client in clients.values() {
            if client.logs_tx.try_send(log.clone()).is_err() {
                metrics.record_channel_drop("logs_fanout");
            }
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[tokio::test]
    async fn register_and_deregister_tracks_count() {
        let registry = ClientRegistry::new();
        let metrics = GatewayMetrics::new(&Registry::new());

        let (id1, _rx1) = registry.register(10, &metrics).await;
        let (_id2, _rx2) = registry.register(10, &metrics).await;
        assert_eq!(registry.len().await, 2);

        registry.deregister(id1, &metrics).await;
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn broadcast_log_reaches_all_clients() {
        let registry = ClientRegistry::new();
        let metrics = GatewayMetrics::new(&Registry::new());

        let (_id1, mut rx1) = registry.register(10, &metrics).await;
        let (_id2, mut rx2) = registry.register(10, &metrics).await;

        let log = TransactionLog {
            tx_hash: "0xabc".to_string(),
            block_number: 1,
            status: "included".to_string(),
            detail: serde_json::Value::Null,
        };
        registry.broadcast_log(&log, &metrics).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
