use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SubsecRound};
use serde::de::DeserializeOwned;

use crate::error::SnapshotError;

/// strftime pattern of a storage key: `YYYY-MM-DD_HH_mm_ss`.
///
/// No fractional seconds and no offset: the key is the wall-clock time as
/// the caller supplied it, truncated to the second.
pub const KEY_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// Extension of every snapshot file.
pub const KEY_EXTENSION: &str = "json";

/// One stored snapshot: capture time (second precision) and its JSON payload.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Snapshot {
    pub timestamp: NaiveDateTime,
    pub payload: serde_json::Value,
}

impl Snapshot {
    pub fn new(timestamp: NaiveDateTime, payload: serde_json::Value) -> Self {
        Self {
            timestamp: truncate_to_second(timestamp),
            payload,
        }
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, SnapshotError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| SnapshotError::format(format!("payload of {}: {e}", format_key(self.timestamp))))
    }
}

/// Drop everything below one second. The store's key resolution.
pub fn truncate_to_second(ts: NaiveDateTime) -> NaiveDateTime {
    ts.trunc_subsecs(0)
}

/// Timestamp → key (file stem, without extension).
pub fn format_key(ts: NaiveDateTime) -> String {
    ts.format(KEY_FORMAT).to_string()
}

/// File name → timestamp. Only the canonical `<key>.json` spelling is a key.
///
/// Returns `None` for anything else (temporaries, names without the
/// extension, unpadded fields) so two files can never claim the same second.
pub fn parse_key(name: &str) -> Option<NaiveDateTime> {
    let stem = name.strip_suffix(KEY_EXTENSION)?.strip_suffix('.')?;
    let ts = NaiveDateTime::parse_from_str(stem, KEY_FORMAT).ok()?;
    (format_key(ts) == stem).then_some(ts)
}

/// File name for a timestamp: `<key>.json`.
pub fn file_name(ts: NaiveDateTime) -> String {
    format!("{}.{KEY_EXTENSION}", format_key(ts))
}

const TEXT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    KEY_FORMAT,
];

/// Parse a user-supplied instant.
///
/// Accepted, in order: RFC 3339 (converted to local wall-clock time),
/// `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DDTHH:MM:SS[.fff]`, the key format,
/// and a bare `YYYY-MM-DD` meaning midnight. The result is not truncated.
pub fn parse_instant(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    for fmt in TEXT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
