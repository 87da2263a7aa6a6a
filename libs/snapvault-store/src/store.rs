use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tokio::sync::broadcast;

use snapvault_api::{Snapshot, SnapshotError, file_name, parse_instant, parse_key, truncate_to_second};

use crate::event::StoreEvent;

// ════════════════════════════════════════════════════════════════
//  FileStore
// ════════════════════════════════════════════════════════════════

/// Time-indexed snapshot store: one `<YYYY-MM-DD_HH_mm_ss>.json` file per
/// snapshot, the directory listing is the index.
///
/// The directory is created lazily on first access. No locking: one store
/// per directory.
pub struct FileStore {
    data_dir: PathBuf,
    /// Notification channel: broadcast on every completed write.
    notify_tx: broadcast::Sender<StoreEvent>,
    tmp_seq: AtomicU64,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("data_dir", &self.data_dir).finish()
    }
}

/// Parsed key and the file it came from.
struct KeyEntry {
    timestamp: NaiveDateTime,
    name: String,
    path: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let (notify_tx, _) = broadcast::channel(64);
        Self {
            data_dir: data_dir.into(),
            notify_tx,
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.notify_tx.subscribe()
    }

    async fn ensure_dir(&self) -> Result<(), SnapshotError> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| SnapshotError::io(format!("mkdir {}: {e}", self.data_dir.display())))
    }

    // ── Write ──

    /// Persist `payload` under `timestamp` truncated to the second.
    ///
    /// A record already stored for the same second is replaced. The file is
    /// written next to its key first and renamed into place, so readers see
    /// either the old record or the new one.
    pub async fn write<T>(&self, payload: &T, timestamp: NaiveDateTime) -> Result<Snapshot, SnapshotError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(payload)
            .map_err(|e| SnapshotError::format(format!("serialize payload: {e}")))?;
        let body = to_pretty_json(&value)?;
        let timestamp = truncate_to_second(timestamp);
        let name = file_name(timestamp);

        self.ensure_dir().await?;

        let path = self.data_dir.join(&name);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.data_dir.join(format!(".{name}.{}-{seq}.tmp", std::process::id()));

        if let Err(e) = tokio::fs::write(&tmp, body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SnapshotError::io(format!("write {}: {e}", tmp.display())));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SnapshotError::io(format!("rename to {}: {e}", path.display())));
        }

        tracing::debug!(file = %path.display(), "snapshot written");

        // Notify subscribers (ignore if no receivers).
        let _ = self.notify_tx.send(StoreEvent::WriteCompleted {
            timestamp,
            payload: value.clone(),
        });

        Ok(Snapshot { timestamp, payload: value })
    }

    /// [`write`](Self::write) at the current local time.
    pub async fn write_now<T>(&self, payload: &T) -> Result<Snapshot, SnapshotError>
    where
        T: Serialize + ?Sized,
    {
        self.write(payload, Local::now().naive_local()).await
    }

    // ── Read ──

    /// Every stored snapshot, in directory listing order.
    pub async fn read_all(&self) -> Result<Vec<Snapshot>, SnapshotError> {
        let entries = self.list_keys().await?;
        let mut result = Vec::with_capacity(entries.len());
        for entry in &entries {
            result.push(load(entry).await?);
        }
        Ok(result)
    }

    /// Snapshots stored exactly at `from` (second precision), or, with `to`,
    /// every snapshot in the inclusive range `[from, to]`. Ascending.
    pub async fn read(
        &self,
        from: NaiveDateTime,
        to: Option<NaiveDateTime>,
    ) -> Result<Vec<Snapshot>, SnapshotError> {
        let start = truncate_to_second(from);
        let end = to.map(truncate_to_second);

        if let Some(end) = end {
            if start > end {
                return Err(SnapshotError::invalid_argument(format!(
                    "first date {start} is after second date {end}"
                )));
            }
        }

        let selected: Vec<KeyEntry> = ordered(self.list_keys().await?)
            .into_iter()
            .filter(|e| match end {
                None => e.timestamp == start,
                Some(end) => e.timestamp >= start && e.timestamp <= end,
            })
            .collect();

        let mut result = Vec::with_capacity(selected.len());
        for entry in &selected {
            result.push(load(entry).await?);
        }
        Ok(result)
    }

    /// Textual form of [`read`](Self::read), validating its arguments.
    pub async fn read_str(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Vec<Snapshot>, SnapshotError> {
        let from = from.ok_or_else(|| SnapshotError::invalid_argument("a date must be provided"))?;
        let start = parse_instant(from)
            .ok_or_else(|| SnapshotError::invalid_argument(format!("invalid first date: '{from}'")))?;
        let end = match to {
            Some(to) => Some(
                parse_instant(to)
                    .ok_or_else(|| SnapshotError::invalid_argument(format!("invalid second date: '{to}'")))?,
            ),
            None => None,
        };
        self.read(start, end).await
    }

    /// Up to `count` most recent snapshots, ascending.
    pub async fn read_last(&self, count: usize) -> Result<Vec<Snapshot>, SnapshotError> {
        if count == 0 {
            return Err(SnapshotError::invalid_argument("last count must be a positive integer"));
        }

        let mut entries = ordered(self.list_keys().await?);
        if entries.len() > count {
            entries = entries.split_off(entries.len() - count);
        }

        let mut result = Vec::with_capacity(entries.len());
        for entry in &entries {
            result.push(load(entry).await?);
        }
        Ok(result)
    }

    /// The most recent snapshot, `None` when the store is empty.
    pub async fn read_latest(&self) -> Result<Option<Snapshot>, SnapshotError> {
        match ordered(self.list_keys().await?).last() {
            Some(entry) => Ok(Some(load(entry).await?)),
            None => Ok(None),
        }
    }

    /// Files of the directory whose names parse as keys. Unordered.
    async fn list_keys(&self) -> Result<Vec<KeyEntry>, SnapshotError> {
        self.ensure_dir().await?;

        let mut dir = tokio::fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| SnapshotError::io(format!("read dir {}: {e}", self.data_dir.display())))?;

        let mut entries = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(e) => {
                    return Err(SnapshotError::io(format!(
                        "read dir {}: {e}",
                        self.data_dir.display()
                    )));
                }
            };
            let path = entry.path();

            // Follows symlinks, like stat(2).
            let meta = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                // Removed between listing and stat.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(SnapshotError::io(format!("stat {}: {e}", path.display()))),
            };
            if !meta.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(timestamp) = parse_key(&name) else {
                tracing::debug!(file = %path.display(), "not a snapshot key, skipping");
                continue;
            };
            entries.push(KeyEntry { timestamp, name, path });
        }
        Ok(entries)
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

/// Ascending by timestamp, ties broken by key.
fn ordered(mut entries: Vec<KeyEntry>) -> Vec<KeyEntry> {
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.name.cmp(&b.name)));
    entries
}

async fn load(entry: &KeyEntry) -> Result<Snapshot, SnapshotError> {
    let bytes = tokio::fs::read(&entry.path)
        .await
        .map_err(|e| SnapshotError::io(format!("read {}: {e}", entry.path.display())))?;
    let payload = serde_json::from_slice(&bytes)
        .map_err(|e| SnapshotError::format(format!("parse {}: {e}", entry.path.display())))?;
    Ok(Snapshot {
        timestamp: entry.timestamp,
        payload,
    })
}

/// JSON with 4-space indentation.
fn to_pretty_json(value: &serde_json::Value) -> Result<Vec<u8>, SnapshotError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| SnapshotError::format(format!("json serialize: {e}")))?;
    Ok(buf)
}
