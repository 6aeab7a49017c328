use loanbook_storage::StorageError;
use loanbook_types::{LoanId, LoanState};
use thiserror::Error;

/// Result type for orchestrator operations.
pub type LoanResult<T> = Result<T, LoanError>;

/// Caller-facing error taxonomy.
///
/// Business-rule failures (everything except `Timeout` and `Storage`)
/// are terminal for the request and must not be retried. `Timeout` and
/// `Storage` may be retried: `approve`/`disburse` are idempotent-safe
/// thanks to the "already exists" guards, but `invest` is NOT — each
/// call intentionally appends a new ledger row, and there is no client
/// idempotency key to dedupe a blind retry.
#[derive(Debug, Error)]
pub enum LoanError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation requires state {required}, current state: {current}")]
    InvalidState {
        current: LoanState,
        required: LoanState,
    },

    #[error("loan {0} already approved")]
    AlreadyApproved(LoanId),

    #[error("loan {0} already disbursed")]
    AlreadyDisbursed(LoanId),

    #[error("loan {0} already fully funded")]
    AlreadyFunded(LoanId),

    #[error(
        "investment would exceed principal: invested {invested_minor} + new {amount_minor} > principal {principal_minor}"
    )]
    OverFunding {
        invested_minor: i64,
        amount_minor: i64,
        principal_minor: i64,
    },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("operation deadline exceeded")]
    Timeout,

    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for LoanError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Storage(other),
        }
    }
}
