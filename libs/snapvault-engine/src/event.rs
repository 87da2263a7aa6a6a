use chrono::NaiveDateTime;

/// Lifecycle notifications of a [`Snapshotter`](crate::Snapshotter) cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A cycle began; the gate has not been consulted yet.
    PreSnapshot { timestamp: NaiveDateTime, count: u64 },
    /// A payload was fetched (and persisted, if this cycle was due).
    Snapshot {
        timestamp: NaiveDateTime,
        count: u64,
        payload: serde_json::Value,
    },
}
