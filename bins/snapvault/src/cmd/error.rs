use snapvault_api::SnapshotError;
use snapvault_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Snapshot(#[from] SnapshotError),

    #[error("capture failed at cycle {0}")]
    CaptureFailed(u64),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
