// core/error.rs
// Error taxonomy for the forecasting/remediation pipeline.
// Insufficient-data skips are NOT errors: stages count them separately.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or malformed input on a manually-invoked action (400).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Acting on a nonexistent recommendation/run/tenant (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Store-level failure (query, constraint, connection).
    #[error("store error: {0}")]
    Store(String),

    /// External action executor or notifier failure.
    #[error("executor error: {0}")]
    Executor(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
