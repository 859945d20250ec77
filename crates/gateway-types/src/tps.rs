use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// The subscriber's rolling buffer of `(timestamp, tx_count)` pairs for the
/// most recent `N` blocks. Eviction is strictly first-in-first-out; the
/// buffer never exceeds its configured capacity.
#[derive(Clone, Debug)]
pub struct TpsWindow {
    capacity: usize,
    entries: VecDeque<(u64, u64)>,
}

impl TpsWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, timestamp: u64, tx_count: u64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((timestamp, tx_count));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u64, u64)> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<(u64, u64)> {
        self.entries.back().copied()
    }

    pub fn oldest(&self) -> Option<(u64, u64)> {
        self.entries.front().copied()
    }
}

/// An append-only chart-history entry, added exactly once per newly
/// observed block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TpsHistoryPoint {
    pub one_second_tps: f64,
    /// Always zero: no vote-level TPS signal is available from this
    /// pipeline, but the field is kept for wire compatibility with older
    /// clients that still read it.
    pub vote_tps: f64,
    pub average_tps: f64,
    pub instant_tps: f64,
    pub tx_count: u64,
}

/// FIFO-capped, append-only history of [`TpsHistoryPoint`]s.
#[derive(Clone, Debug)]
pub struct TpsHistory {
    capacity: usize,
    points: VecDeque<TpsHistoryPoint>,
}

impl TpsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            points: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: TpsHistoryPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn snapshot(&self) -> Vec<TpsHistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_evicts_oldest_at_capacity() {
        let mut window = TpsWindow::new(3);
        window.push(1, 10);
        window.push(2, 20);
        window.push(3, 30);
        window.push(4, 40);

        assert_eq!(window.len(), 3);
        assert_eq!(window.oldest(), Some((2, 20)));
        assert_eq!(window.latest(), Some((4, 40)));
    }

    #[test]
    fn history_is_fifo_capped() {
        let mut history = TpsHistory::new(2);
        history.push(TpsHistoryPoint { tx_count: 1, ..Default::default() });
        history.push(TpsHistoryPoint { tx_count: 2, ..Default::default() });
        history.push(TpsHistoryPoint { tx_count: 3, ..Default::default() });

        let snap = history.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].tx_count, 2);
        assert_eq!(snap[1].tx_count, 3);
    }
}
