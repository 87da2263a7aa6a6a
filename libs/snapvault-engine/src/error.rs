#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A config value the scheduler refuses, prefixed with its key.
    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn config(key: &str, msg: impl std::fmt::Display) -> Self {
        EngineError::Config(format!("{key}: {msg}"))
    }
}
