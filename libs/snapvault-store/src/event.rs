use chrono::NaiveDateTime;

/// Notification broadcast by [`FileStore`](crate::FileStore).
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A snapshot file has been written and is visible to readers.
    WriteCompleted {
        timestamp: NaiveDateTime,
        payload: serde_json::Value,
    },
}
