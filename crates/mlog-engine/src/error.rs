//! Engine error types.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Step executable missing: {0}")]
    MissingExecutable(String),

    #[error("Failed to spawn step process: {0}")]
    SpawnFailed(String),

    #[error("Store error: {0}")]
    Store(#[from] mlog_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Fatal errors mean the task cannot make progress without operator
    /// action; the record is left untouched.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigError(_)
                | EngineError::MissingExecutable(_)
                | EngineError::SpawnFailed(_)
        )
    }
}
