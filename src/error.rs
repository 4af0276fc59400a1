use alloy_primitives::Address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No endpoint is usable (all unsynced or unreachable).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// The provider refused a log query because the range holds too many results.
    #[error("Log range too large: {0}")]
    LogRangeTooLarge(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cursor regression on {target}: current {current}, requested {requested}")]
    CursorRegression {
        target: String,
        current: u64,
        requested: u64,
    },

    #[error("Negative balance for {account} at block {block_number}")]
    NegativeBalance { account: Address, block_number: u64 },

    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IndexerError {
    /// Infrastructure errors that clear up on their own; the next tick retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexerError::ServiceUnavailable(_)
                | IndexerError::Rpc(_)
                | IndexerError::Timeout(_)
                | IndexerError::LogRangeTooLarge(_)
                | IndexerError::Database(_)
        )
    }

    /// Errors the scheduler must not swallow.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IndexerError::CursorRegression { .. } | IndexerError::LockPoisoned(_)
        )
    }
}

pub type IndexerResult<T> = Result<T, IndexerError>;
