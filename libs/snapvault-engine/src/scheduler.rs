use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use snapvault_api::{Fetcher, SnapshotError};
use snapvault_store::FileStore;

use crate::config::{OverlapPolicy, SchedulerConfig};
use crate::error::EngineError;
use crate::event::SchedulerEvent;

type Gate = Arc<dyn Fn(NaiveDateTime, u64) -> bool + Send + Sync>;
type CaptureHook = Arc<dyn Fn(&serde_json::Value, NaiveDateTime, u64) + Send + Sync>;
type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Result of one capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Payload fetched; `persisted` tells whether this cycle was due for a write.
    Captured { count: u64, persisted: bool },
    /// The gate returned false. The cycle number stays consumed.
    Vetoed { count: u64 },
    /// Fetch or write failed. The cycle number has been given back.
    Failed { count: u64 },
    /// Another cycle was in flight and the overlap policy is `Skip`.
    Skipped,
}

// ════════════════════════════════════════════════════════════════
//  Shared cycle state
// ════════════════════════════════════════════════════════════════

struct Shared {
    store: Arc<FileStore>,
    fetcher: Arc<dyn Fetcher>,
    clock: Clock,
    cadence_ms: AtomicU64,
    persist_every: AtomicU64,
    skip_overlap: AtomicBool,
    gate: RwLock<Option<Gate>>,
    on_capture: RwLock<Option<CaptureHook>>,
    count: AtomicU64,
    in_flight: AtomicUsize,
    events_tx: broadcast::Sender<SchedulerEvent>,
}

/// Decrements the in-flight counter when the cycle ends, however it ends.
struct FlightGuard<'a>(&'a AtomicUsize);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    fn enter_flight(&self) -> Option<FlightGuard<'_>> {
        let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = FlightGuard(&self.in_flight);
        if previous > 0 && self.skip_overlap.load(Ordering::SeqCst) {
            return None;
        }
        Some(guard)
    }

    /// Give back the cycle number taken at the start of a failed cycle.
    fn rollback(&self) {
        let _ = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1)));
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let Some(_flight) = self.enter_flight() else {
            tracing::warn!("previous snapshot still in flight, skipping tick");
            return CycleOutcome::Skipped;
        };

        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        let timestamp = (self.clock)();

        let _ = self.events_tx.send(SchedulerEvent::PreSnapshot { timestamp, count });

        let gate = read_lock(&self.gate).clone();
        if let Some(gate) = gate {
            if !gate(timestamp, count) {
                tracing::debug!(%timestamp, count, "snapshot vetoed by gate");
                return CycleOutcome::Vetoed { count };
            }
        }

        let payload = match self.fetcher.fetch().await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(%timestamp, count, error = %e, "error whilst fetching snapshot");
                self.rollback();
                return CycleOutcome::Failed { count };
            }
        };

        let every = self.persist_every.load(Ordering::SeqCst);
        let persisted = every != 0 && count % every == 0;
        if persisted {
            if let Err(e) = self.store.write(&payload, timestamp).await {
                tracing::error!(%timestamp, count, error = %e, "error whilst persisting snapshot");
                self.rollback();
                return CycleOutcome::Failed { count };
            }
        }

        let _ = self.events_tx.send(SchedulerEvent::Snapshot {
            timestamp,
            count,
            payload: payload.clone(),
        });

        let hook = read_lock(&self.on_capture).clone();
        if let Some(hook) = hook {
            hook(&payload, timestamp, count);
        }

        tracing::debug!(%timestamp, count, persisted, "snapshot captured");
        CycleOutcome::Captured { count, persisted }
    }
}

fn spawn_cycle(shared: &Arc<Shared>) {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        shared.run_cycle().await;
    });
}

/// Immediate cycle, then one cycle per `cadence` until cancelled.
async fn run_timer(shared: Arc<Shared>, cadence: Duration, token: CancellationToken) {
    // Re-armed before this task was first polled.
    if token.is_cancelled() {
        return;
    }
    spawn_cycle(&shared);
    if cadence.is_zero() {
        return;
    }

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + cadence, cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => spawn_cycle(&shared),
        }
    }
    tracing::debug!("snapshot timer stopped");
}

// ════════════════════════════════════════════════════════════════
//  Snapshotter
// ════════════════════════════════════════════════════════════════

/// Timer + cancellation handle of a running schedule.
struct RunSlot {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodically fetches a payload and routes it into a [`FileStore`].
///
/// `start()` runs one cycle right away and then one per cadence. Each cycle
/// is its own task: a failed fetch or write is logged, its cycle number is
/// given back, and the schedule carries on. With [`OverlapPolicy::Allow`] a
/// slow cycle may overlap the next one.
pub struct Snapshotter {
    shared: Arc<Shared>,
    run: Mutex<Option<RunSlot>>,
}

impl std::fmt::Debug for Snapshotter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshotter")
            .field("store", &self.shared.store)
            .field("cadence", &self.cadence())
            .field("persist_every", &self.persist_every())
            .field("count", &self.capture_count())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Snapshotter {
    /// Snapshotter with default settings: 20 minute cadence, persist every
    /// capture, no gate, no capture hook. Timestamps come from the local clock.
    pub fn new(store: Arc<FileStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_clock(store, fetcher, || Local::now().naive_local())
    }

    /// Like [`new`](Self::new) with a custom timestamp source.
    pub fn with_clock<C>(store: Arc<FileStore>, fetcher: Arc<dyn Fetcher>, clock: C) -> Self
    where
        C: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        let defaults = SchedulerConfig::default();
        let (events_tx, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                store,
                fetcher,
                clock: Arc::new(clock),
                cadence_ms: AtomicU64::new(defaults.cadence_ms.unsigned_abs()),
                persist_every: AtomicU64::new(defaults.persist_every.unsigned_abs()),
                skip_overlap: AtomicBool::new(defaults.overlap == OverlapPolicy::Skip),
                gate: RwLock::new(None),
                on_capture: RwLock::new(None),
                count: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                events_tx,
            }),
            run: Mutex::new(None),
        }
    }

    /// Build from config, validating every value through the setters.
    pub fn from_config(
        config: &SchedulerConfig,
        store: Arc<FileStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, EngineError> {
        let snapshotter = Self::new(store, fetcher);
        snapshotter
            .set_cadence_ms(config.cadence_ms)
            .map_err(|e| EngineError::config("scheduler.cadence_ms", e.message))?;
        snapshotter
            .set_persist_every(config.persist_every)
            .map_err(|e| EngineError::config("scheduler.persist_every", e.message))?;
        snapshotter.set_overlap(config.overlap);
        Ok(snapshotter)
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.shared.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Cycle number of the most recent cycle since `start()`.
    pub fn capture_count(&self) -> u64 {
        self.shared.count.load(Ordering::SeqCst)
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.shared.cadence_ms.load(Ordering::SeqCst))
    }

    pub fn persist_every(&self) -> u64 {
        self.shared.persist_every.load(Ordering::SeqCst)
    }

    pub fn overlap(&self) -> OverlapPolicy {
        if self.shared.skip_overlap.load(Ordering::SeqCst) {
            OverlapPolicy::Skip
        } else {
            OverlapPolicy::Allow
        }
    }

    // ── Setters ──

    /// Milliseconds between cycles; 0 means a single cycle per `start()`.
    /// Takes effect on the next `start()`.
    pub fn set_cadence_ms(&self, ms: i64) -> Result<(), SnapshotError> {
        let ms = u64::try_from(ms).map_err(|_| {
            SnapshotError::invalid_argument(format!("cadence must be a non-negative integer, got {ms}"))
        })?;
        self.shared.cadence_ms.store(ms, Ordering::SeqCst);
        Ok(())
    }

    /// Persist every Nth cycle; 0 disables persistence.
    pub fn set_persist_every(&self, every: i64) -> Result<(), SnapshotError> {
        let every = u64::try_from(every).map_err(|_| {
            SnapshotError::invalid_argument(format!(
                "persist rate must be a non-negative integer, got {every}"
            ))
        })?;
        self.shared.persist_every.store(every, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_overlap(&self, policy: OverlapPolicy) {
        self.shared
            .skip_overlap
            .store(policy == OverlapPolicy::Skip, Ordering::SeqCst);
    }

    /// Predicate consulted before every fetch with `(timestamp, count)`.
    /// Returning false abandons the cycle.
    pub fn set_gate<F>(&self, gate: F)
    where
        F: Fn(NaiveDateTime, u64) -> bool + Send + Sync + 'static,
    {
        *write_lock(&self.shared.gate) = Some(Arc::new(gate));
    }

    pub fn clear_gate(&self) {
        *write_lock(&self.shared.gate) = None;
    }

    /// Called after every successful cycle with `(payload, timestamp, count)`.
    pub fn set_on_capture<F>(&self, hook: F)
    where
        F: Fn(&serde_json::Value, NaiveDateTime, u64) + Send + Sync + 'static,
    {
        *write_lock(&self.shared.on_capture) = Some(Arc::new(hook));
    }

    pub fn clear_on_capture(&self) {
        *write_lock(&self.shared.on_capture) = None;
    }

    // ── Lifecycle ──

    /// Reset the cycle count, spawn an immediate cycle and, if the cadence is
    /// non-zero, arm the recurring timer. Starting a running snapshotter
    /// re-arms it.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self) {
        let mut slot = lock(&self.run);
        if let Some(previous) = slot.take() {
            previous.token.cancel();
            tracing::debug!("snapshotter already running, re-arming");
        }

        self.shared.count.store(0, Ordering::SeqCst);

        let cadence = self.cadence();
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_timer(Arc::clone(&self.shared), cadence, token.clone()));
        *slot = Some(RunSlot { token, handle });

        tracing::info!(
            cadence_ms = cadence.as_millis() as u64,
            persist_every = self.persist_every(),
            dir = %self.shared.store.data_dir().display(),
            "snapshotter started"
        );
    }

    /// Cancel the timer. Cycles already in flight run to completion.
    /// No-op when not running.
    pub fn stop(&self) {
        let Some(slot) = lock(&self.run).take() else {
            return;
        };
        slot.token.cancel();
        drop(slot.handle);
        tracing::info!(count = self.capture_count(), "snapshotter stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).is_some()
    }

    /// Run one cycle inline and report how it ended. Scheduled ticks run
    /// exactly this.
    pub async fn capture(&self) -> CycleOutcome {
        self.shared.run_cycle().await
    }
}

impl Drop for Snapshotter {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Lock helpers: a panicking gate or hook must not wedge the scheduler.
// ---------------------------------------------------------------------------

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("snapshotter run lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn read_lock<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match l.read() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("snapshotter callback lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_lock<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match l.write() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("snapshotter callback lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
