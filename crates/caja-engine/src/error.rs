//! # Engine Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      EngineError                                        │
//! │                                                                         │
//! │  Core(CoreError)   business answer: OutOfStock, ShiftClosed,           │
//! │                    InvalidTender, AlreadySettled, ...                   │
//! │                    → shown to the cashier, never retried                │
//! │                                                                         │
//! │  Db(DbError)       storage failure                                      │
//! │                    → retried when `is_retryable()` (busy, pool)         │
//! │                                                                         │
//! │  Timeout           one attempt ran past `tx_timeout` (rolled back)      │
//! │                    → retried                                            │
//! │                                                                         │
//! │  Unavailable       retries exhausted; reported upward unresolved        │
//! │                                                                         │
//! │  Config            configuration file or environment is unusable       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use caja_core::{CoreError, ValidationError};
use caja_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// One attempt did not finish within the transaction timeout.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// Storage kept failing after every retry.
    #[error("{operation} unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        operation: &'static str,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Returns true for infrastructure failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Db(err) => err.is_retryable(),
            EngineError::Timeout { .. } => true,
            EngineError::Core(_) | EngineError::Unavailable { .. } | EngineError::Config(_) => {
                false
            }
        }
    }

    /// The business error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}
