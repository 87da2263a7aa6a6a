use std::path::PathBuf;

use serde::Deserialize;

/// Default cadence: every 20 minutes.
pub const DEFAULT_CADENCE_MS: i64 = 20 * 60 * 1000;

/// What a tick does when the previous cycle is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Start the new cycle anyway; cycles may run concurrently.
    #[default]
    Allow,
    /// Skip the tick. The skipped tick does not consume a cycle number.
    Skip,
}

/// Scheduler settings. Values are signed so that a bad config surfaces as
/// a validation error instead of a parse error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchedulerConfig {
    /// Milliseconds between cycle starts. 0 = a single cycle per `start()`.
    #[serde(default = "default_cadence_ms")]
    pub cadence_ms: i64,

    /// Persist every Nth successful cycle. 1 = always, 0 = never.
    #[serde(default = "default_persist_every")]
    pub persist_every: i64,

    #[serde(default)]
    pub overlap: OverlapPolicy,
}

fn default_cadence_ms() -> i64 {
    DEFAULT_CADENCE_MS
}

fn default_persist_every() -> i64 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence_ms: default_cadence_ms(),
            persist_every: default_persist_every(),
            overlap: OverlapPolicy::default(),
        }
    }
}

/// Store location plus scheduler settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the snapshot files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.cadence_ms, 1_200_000);
        assert_eq!(cfg.persist_every, 1);
        assert_eq!(cfg.overlap, OverlapPolicy::Allow);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{ "scheduler": { "persist_every": 3 } }"#).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.scheduler.cadence_ms, DEFAULT_CADENCE_MS);
        assert_eq!(cfg.scheduler.persist_every, 3);
    }

    #[test]
    fn overlap_is_snake_case() {
        let cfg: SchedulerConfig = serde_json::from_str(r#"{ "overlap": "skip" }"#).unwrap();
        assert_eq!(cfg.overlap, OverlapPolicy::Skip);
        assert!(serde_json::from_str::<SchedulerConfig>(r#"{ "overlap": "queue" }"#).is_err());
    }
}
