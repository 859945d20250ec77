use serde::{Deserialize, Serialize};

/// Status bag for the upstream event-ring collector, exposed verbatim at
/// `GET /api/v1/event-rings`. Named after the legacy event-ring reader this
/// gateway's wire protocol still advertises; backed here by the block
/// subscriber's own frame counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRingStatus {
    pub connected: bool,
    pub events_received: u64,
    pub bytes_received: u64,
    pub missed_events: u64,
    pub parse_errors: u64,
    pub last_sequence: u64,
    pub buffer_size: usize,
}
