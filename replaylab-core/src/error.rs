use thiserror::Error;

/// Why a run did not complete.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid inputs detected before any simulation state exists.
    #[error("configuration error: {0}")]
    Config(String),

    /// Cooperative abort. Not a failure.
    #[error("run cancelled")]
    Cancelled,

    #[error("strategy failed in {hook} at {timestamp_ms}: {message}")]
    Strategy {
        hook: &'static str,
        timestamp_ms: i64,
        message: String,
    },
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
