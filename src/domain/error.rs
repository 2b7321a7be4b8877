//! Application error taxonomy.
//!
//! Raw RPC and database failures are translated into these variants at the
//! infrastructure boundary so that downstream logic (retry executor, job
//! dispatch) matches on a closed set of tags instead of inspecting strings.

use thiserror::Error;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Blockchain error: {0}")]
    Blockchain(#[from] BlockchainError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

/// Configuration errors. Always fatal, raised before any network attempt.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(String),

    #[error("invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Database errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Blockchain errors, tagged by retryability class.
///
/// The retry executor and the job dispatcher branch on these tags; the
/// mapping from raw JSON-RPC error payloads happens in `infra::rpc`.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// Network timeout/reset, unhealthy endpoint after failover, or any
    /// other transient condition that is safe to retry from scratch.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Nonce already used or replacement underpriced. Safe to retry after
    /// resetting local nonce tracking, provided no hash was obtained.
    #[error("nonce conflict: {0}")]
    NonceConflict(String),

    /// Signer balance cannot cover gas. Fatal.
    #[error("insufficient funds for gas")]
    InsufficientFunds,

    /// The chain executed the transaction and reverted it. Fatal.
    #[error("transaction reverted on-chain: {0}")]
    Reverted(String),

    /// A successful receipt did not contain the expected event. Indicates a
    /// contract-behavior mismatch, not a transient fault. Fatal.
    #[error("expected event missing from receipt: {0}")]
    MissingEvent(String),

    /// The transaction was broadcast but confirmation did not complete
    /// in-process. Never retried as a resubmit; the caller hands the hash
    /// off to the confirmation monitor.
    #[error("transaction submitted but unconfirmed: {tx_hash}")]
    Unconfirmed { tx_hash: String },

    /// Any other RPC-level error. Not retryable.
    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Validation errors for incoming requests
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid field {field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("{0}")]
    Multiple(String),
}

impl BlockchainError {
    /// Whether the whole operation may safely be re-run from the top.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::NonceConflict(_))
    }
}

impl AppError {
    /// Retryability classification used by the retry executor.
    ///
    /// Database errors are not retried here: the job queue's own
    /// backoff/reschedule machinery owns persistence retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Blockchain(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::Blockchain(BlockchainError::Transient("timeout".into())).is_retryable());
        assert!(
            AppError::Blockchain(BlockchainError::NonceConflict("nonce too low".into()))
                .is_retryable()
        );

        assert!(!AppError::Blockchain(BlockchainError::InsufficientFunds).is_retryable());
        assert!(!AppError::Blockchain(BlockchainError::Reverted("boom".into())).is_retryable());
        assert!(
            !AppError::Blockchain(BlockchainError::Unconfirmed {
                tx_hash: "0xabc".into()
            })
            .is_retryable()
        );
        assert!(!AppError::Config(ConfigError::Missing("RPC_URL".into())).is_retryable());
        assert!(!AppError::Database(DatabaseError::Query("oops".into())).is_retryable());
    }
}
