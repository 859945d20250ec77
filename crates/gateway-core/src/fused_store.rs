use gateway_types::fused::FusedSnapshot;
use parking_lot::RwLock;

/// The single writable view every broadcast tick reads from. Updated by the
/// block subscriber's driver task on every newly enriched block; readers
/// take a read lock and clone, never holding the lock across an await.
pub struct FusedSnapshotStore {
    inner: RwLock<Option<FusedSnapshot>>,
}

impl FusedSnapshotStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(None) }
    }

    /// Replaces the stored snapshot. Silently refuses to move the
    /// timestamp backwards so a stale update racing a fresher one cannot
    /// regress the view.
    pub fn publish(&self, snapshot: FusedSnapshot) {
        let mut guard = self.inner.write();
        if let Some(existing) = guard.as_ref() {
            if snapshot.timestamp < existing.timestamp {
                return;
            }
        }
        *guard = Some(snapshot);
    }

    pub fn current(&self) -> Option<FusedSnapshot> {
        self.inner.read().clone()
    }
}

impl Default for FusedSnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::fused::{ConsensusInfo, ExecutionInfo, NetworkInfo};
    use gateway_types::waterfall::{canonical_nodes, WaterfallGraph, WaterfallMetadata, SourceTag};
    use std::collections::BTreeMap;

    fn snapshot_at(timestamp: u64) -> FusedSnapshot {
        FusedSnapshot {
            timestamp,
            network: NetworkInfo::default(),
            consensus: ConsensusInfo::default(),
            execution: ExecutionInfo::default(),
            waterfall: WaterfallGraph {
                nodes: canonical_nodes(),
                links: Vec::new(),
                metadata: WaterfallMetadata {
                    source: SourceTag::MockData,
                    tps: 0.0,
                    pending_tx_count: 0,
                    tracked_tx_count: 0,
                    block_height: None,
                    consensus: None,
                },
                drops: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn timestamp_never_regresses() {
        let store = FusedSnapshotStore::new();
        store.publish(snapshot_at(100));
        store.publish(snapshot_at(50));
        assert_eq!(store.current().unwrap().timestamp, 100);

        store.publish(snapshot_at(150));
        assert_eq!(store.current().unwrap().timestamp, 150);
    }

    #[test]
    fn empty_store_returns_none() {
        let store = FusedSnapshotStore::new();
        assert!(store.current().is_none());
    }
}
