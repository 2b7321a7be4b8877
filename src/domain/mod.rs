//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{AppError, BlockchainError, ConfigError, DatabaseError, ValidationError};
pub use traits::{ChainClient, JobStore};
pub use types::{
    BurnRequest, BurnResult, ChainSettings, CreatedWallet, EnqueueJobRequest, ErrorDetail,
    ErrorResponse, HealthResponse, HealthStatus, Job, JobListParams, JobStatus, JobType,
    MintCompletion, MintRequest, MintResult, MintedToken, OrderDetails, PendingTransaction,
    PendingTxStatus, ReceiptSummary,
};
