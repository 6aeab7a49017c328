use async_trait::async_trait;
use loanbook_types::{Approval, Disbursement, Investment, Investor, InvestorId, Loan, LoanId};

use crate::StorageResult;

/// Storage interface for the loan lifecycle core.
///
/// Implementations must provide per-call atomicity: each method either
/// fully applies or leaves storage unchanged. Cross-call serialization is
/// the caller's concern.
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Persist a newly created loan.
    async fn create_loan(&self, loan: &Loan) -> StorageResult<()>;

    /// Fetch one loan with its approval, investments, and disbursement
    /// preloaded. Absence is `Ok(None)`, never an error.
    async fn get_loan(&self, id: &LoanId) -> StorageResult<Option<Loan>>;

    /// Persist a state/timestamp mutation on an existing loan.
    async fn update_loan(&self, loan: &Loan) -> StorageResult<()>;

    /// All loans with nested records populated, newest-first.
    async fn list_loans(&self) -> StorageResult<Vec<Loan>>;

    /// Record the one-time approval. Fails with `Conflict` if the loan
    /// already has one.
    async fn create_approval(&self, approval: &Approval) -> StorageResult<()>;

    /// Append one ledger row.
    async fn create_investment(&self, investment: &Investment) -> StorageResult<()>;

    /// Record the one-time disbursement. Fails with `Conflict` if the
    /// loan already has one.
    async fn create_disbursement(&self, disbursement: &Disbursement) -> StorageResult<()>;

    /// Register a new investor. Fails with `Conflict` when the contact
    /// address is already taken; callers resolve that by re-reading.
    async fn create_investor(&self, investor: &Investor) -> StorageResult<()>;

    async fn get_investor(&self, id: &InvestorId) -> StorageResult<Option<Investor>>;

    /// Lookup by contact address. Absence is `Ok(None)`.
    async fn find_investor_by_email(&self, email: &str) -> StorageResult<Option<Investor>>;

    /// Sum of all investment rows for the loan, recomputed from the
    /// ledger on every call.
    async fn total_invested(&self, loan_id: &LoanId) -> StorageResult<i64>;
}
