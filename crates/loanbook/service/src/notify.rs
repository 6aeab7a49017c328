//! Funding-complete notification port.

use async_trait::async_trait;
use loanbook_types::Loan;
use thiserror::Error;
use tracing::info;

/// Delivery failure from a notifier backend. The orchestrator logs it
/// and moves on; it never rolls back the financial write.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Fire-and-forget notification when a loan becomes fully funded.
#[async_trait]
pub trait FundingNotifier: Send + Sync {
    async fn notify_fully_funded(&self, loan: &Loan, total_minor: i64) -> Result<(), NotifyError>;
}

/// Default notifier: records the event in the log stream.
pub struct LogNotifier;

#[async_trait]
impl FundingNotifier for LogNotifier {
    async fn notify_fully_funded(&self, loan: &Loan, total_minor: i64) -> Result<(), NotifyError> {
        info!(
            loan_id = %loan.id,
            total_minor,
            "loan fully funded; sending agreement link to investors"
        );
        Ok(())
    }
}
