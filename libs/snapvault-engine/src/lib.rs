pub mod config;
pub mod error;
pub mod event;
pub mod scheduler;

pub use config::{EngineConfig, OverlapPolicy, SchedulerConfig};
pub use error::EngineError;
pub use event::SchedulerEvent;
pub use scheduler::{CycleOutcome, Snapshotter};
