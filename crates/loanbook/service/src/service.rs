//! Lifecycle orchestration for loans.
//!
//! [`LoanService`] is the single gatekeeper for all loan mutations: it
//! loads the aggregate through the persistence port, checks the current
//! state, records the approval/investment/disbursement, and persists the
//! transition. The request layer depends only on the four mutating
//! intents and two queries exposed here, never on the storage port.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use loanbook_storage::{LoanStore, StorageError, StorageResult};
use loanbook_types::{
    Approval, ApprovalId, Disbursement, DisbursementId, Investment, InvestmentId, Investor,
    InvestorId, InvestorParty, Loan, LoanDraft, LoanId, LoanState,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{LoanError, LoanResult};
use crate::locks::LoanLocks;
use crate::notify::{FundingNotifier, LogNotifier};

/// Orchestrator configuration.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Deadline applied when the caller supplies none. Covers lock
    /// acquisition and the read/validate phase of each operation.
    pub default_deadline: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_deadline: Duration::from_secs(5),
        }
    }
}

/// Remaining time budget for one operation.
struct Budget {
    started: Instant,
    total: Duration,
}

impl Budget {
    fn new(total: Duration) -> Self {
        Self {
            started: Instant::now(),
            total,
        }
    }

    fn remaining(&self) -> LoanResult<Duration> {
        self.total
            .checked_sub(self.started.elapsed())
            .ok_or(LoanError::Timeout)
    }
}

/// Run one storage call under the operation's remaining budget.
async fn bounded<T, F>(budget: &Budget, fut: F) -> LoanResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(budget.remaining()?, fut).await {
        Ok(result) => result.map_err(LoanError::from),
        Err(_) => Err(LoanError::Timeout),
    }
}

/// The loan lifecycle orchestrator.
///
/// Mutating operations (`approve_loan`, `invest_in_loan`,
/// `disburse_loan`) serialize per loan: the whole read-check-write runs
/// under that loan's mutex, so two concurrent contributions can never
/// both observe the same pre-write total. Reads are lock-free and may
/// observe a stale-but-consistent snapshot.
///
/// Every operation accepts an optional deadline. Expiry during lock
/// acquisition or the read/validate phase returns [`LoanError::Timeout`]
/// with storage untouched; once the write phase of an operation starts
/// it runs to completion, so partial state is never left behind.
pub struct LoanService {
    store: Arc<dyn LoanStore>,
    notifier: Arc<dyn FundingNotifier>,
    locks: LoanLocks,
    config: ServiceConfig,
}

impl LoanService {
    /// Construct with the default config and the logging notifier.
    pub fn new(store: Arc<dyn LoanStore>) -> Self {
        Self::with_config(store, ServiceConfig::default())
    }

    pub fn with_config(store: Arc<dyn LoanStore>, config: ServiceConfig) -> Self {
        Self {
            store,
            notifier: Arc::new(LogNotifier),
            locks: LoanLocks::new(),
            config,
        }
    }

    /// Replace the funding-complete notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn FundingNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    fn budget(&self, deadline: Option<Duration>) -> Budget {
        Budget::new(deadline.unwrap_or(self.config.default_deadline))
    }

    async fn load_loan(&self, budget: &Budget, loan_id: &LoanId) -> LoanResult<Loan> {
        bounded(budget, self.store.get_loan(loan_id))
            .await?
            .ok_or_else(|| LoanError::NotFound(format!("loan {} not found", loan_id)))
    }

    /// Create a new loan in the `proposed` state.
    pub async fn create_loan(
        &self,
        draft: LoanDraft,
        deadline: Option<Duration>,
    ) -> LoanResult<Loan> {
        if draft.principal_minor <= 0 {
            return Err(LoanError::InvalidAmount(draft.principal_minor));
        }

        let budget = self.budget(deadline);
        let now = Utc::now();
        let loan = Loan {
            id: LoanId::generate(),
            borrower_id: draft.borrower_id,
            principal_minor: draft.principal_minor,
            rate: draft.rate,
            roi: draft.roi,
            agreement_letter_url: draft.agreement_letter_url,
            state: LoanState::Proposed,
            created_at: now,
            updated_at: now,
            approval: None,
            investments: vec![],
            disbursement: None,
        };

        bounded(&budget, self.store.create_loan(&loan)).await?;
        debug!(loan_id = %loan.id, principal_minor = loan.principal_minor, "loan created");
        Ok(loan)
    }

    /// Record the one-time human approval and move the loan to
    /// `approved`.
    pub async fn approve_loan(
        &self,
        loan_id: &LoanId,
        picture_proof_url: String,
        employee_id: String,
        approval_date: DateTime<Utc>,
        deadline: Option<Duration>,
    ) -> LoanResult<Loan> {
        let budget = self.budget(deadline);
        let _guard = self.locks.acquire(loan_id, budget.remaining()?).await?;

        let mut loan = self.load_loan(&budget, loan_id).await?;
        if loan.state != LoanState::Proposed {
            return Err(LoanError::InvalidState {
                current: loan.state,
                required: LoanState::Proposed,
            });
        }
        if loan.approval.is_some() {
            return Err(LoanError::AlreadyApproved(loan_id.clone()));
        }

        let now = Utc::now();
        let approval = Approval {
            id: ApprovalId::generate(),
            loan_id: loan.id.clone(),
            picture_proof_url,
            employee_id,
            approval_date,
            created_at: now,
        };

        // Commit point: writes below run to completion.
        budget.remaining()?;
        match self.store.create_approval(&approval).await {
            Ok(()) => {}
            // A caller that raced past the state check loses here.
            Err(StorageError::Conflict(_)) => {
                return Err(LoanError::AlreadyApproved(loan_id.clone()))
            }
            Err(err) => return Err(err.into()),
        }
        loan.state = LoanState::Approved;
        loan.updated_at = now;
        self.store.update_loan(&loan).await?;
        loan.approval = Some(approval);

        info!(loan_id = %loan.id, state = %loan.state, "loan approved");
        Ok(loan)
    }

    /// Record one contribution toward an approved loan.
    ///
    /// The over-funding guard and the ledger append are serialized by
    /// the per-loan mutex; reaching the principal exactly promotes the
    /// loan to `invested` within the same guarded section.
    pub async fn invest_in_loan(
        &self,
        loan_id: &LoanId,
        party: InvestorParty,
        amount_minor: i64,
        deadline: Option<Duration>,
    ) -> LoanResult<Loan> {
        if amount_minor <= 0 {
            return Err(LoanError::InvalidAmount(amount_minor));
        }

        let budget = self.budget(deadline);
        let _guard = self.locks.acquire(loan_id, budget.remaining()?).await?;

        let mut loan = self.load_loan(&budget, loan_id).await?;
        if loan.state >= LoanState::Invested {
            return Err(LoanError::AlreadyFunded(loan_id.clone()));
        }
        if loan.state != LoanState::Approved {
            return Err(LoanError::InvalidState {
                current: loan.state,
                required: LoanState::Approved,
            });
        }

        let investor = self.resolve_investor(&budget, party).await?;

        let invested = bounded(&budget, self.store.total_invested(loan_id)).await?;
        // An unrepresentable sum is by definition beyond any principal.
        let total = match invested.checked_add(amount_minor) {
            Some(total) if total <= loan.principal_minor => total,
            _ => {
                return Err(LoanError::OverFunding {
                    invested_minor: invested,
                    amount_minor,
                    principal_minor: loan.principal_minor,
                })
            }
        };

        let now = Utc::now();
        let investment = Investment {
            id: InvestmentId::generate(),
            loan_id: loan.id.clone(),
            investor_id: investor.id.clone(),
            amount_minor,
            created_at: now,
        };

        // Commit point: writes below run to completion.
        budget.remaining()?;
        self.store.create_investment(&investment).await?;

        if total == loan.principal_minor {
            loan.state = LoanState::Invested;
            loan.updated_at = now;
            self.store.update_loan(&loan).await?;
            info!(loan_id = %loan.id, total_minor = total, "loan fully funded");
            if let Err(err) = self.notifier.notify_fully_funded(&loan, total).await {
                // Fire-and-forget: delivery failure never rolls back
                // the financial write.
                warn!(loan_id = %loan.id, error = %err, "funding notification failed");
            }
        } else {
            debug!(
                loan_id = %loan.id,
                investor_id = %investor.id,
                amount_minor,
                total_minor = total,
                "investment recorded"
            );
        }

        loan.investments.push(investment);
        Ok(loan)
    }

    /// Record the one-time final hand-off and move the loan to
    /// `disbursed`.
    pub async fn disburse_loan(
        &self,
        loan_id: &LoanId,
        agreement_url: String,
        employee_id: String,
        disbursement_date: DateTime<Utc>,
        deadline: Option<Duration>,
    ) -> LoanResult<Loan> {
        let budget = self.budget(deadline);
        let _guard = self.locks.acquire(loan_id, budget.remaining()?).await?;

        let mut loan = self.load_loan(&budget, loan_id).await?;
        if loan.state != LoanState::Invested {
            return Err(LoanError::InvalidState {
                current: loan.state,
                required: LoanState::Invested,
            });
        }
        if loan.disbursement.is_some() {
            return Err(LoanError::AlreadyDisbursed(loan_id.clone()));
        }

        let now = Utc::now();
        let disbursement = Disbursement {
            id: DisbursementId::generate(),
            loan_id: loan.id.clone(),
            agreement_url,
            employee_id,
            disbursement_date,
            created_at: now,
        };

        // Commit point: writes below run to completion.
        budget.remaining()?;
        match self.store.create_disbursement(&disbursement).await {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                return Err(LoanError::AlreadyDisbursed(loan_id.clone()))
            }
            Err(err) => return Err(err.into()),
        }
        loan.state = LoanState::Disbursed;
        loan.updated_at = now;
        self.store.update_loan(&loan).await?;
        loan.disbursement = Some(disbursement);

        info!(loan_id = %loan.id, state = %loan.state, "loan disbursed");
        Ok(loan)
    }

    /// Fetch one loan with its approval, investments, and disbursement.
    /// Lock-free.
    pub async fn get_loan(&self, loan_id: &LoanId, deadline: Option<Duration>) -> LoanResult<Loan> {
        let budget = self.budget(deadline);
        self.load_loan(&budget, loan_id).await
    }

    /// All loans with nested records, newest-first. Lock-free.
    pub async fn list_loans(&self, deadline: Option<Duration>) -> LoanResult<Vec<Loan>> {
        let budget = self.budget(deadline);
        bounded(&budget, self.store.list_loans()).await
    }

    /// Resolve the contributing investor.
    ///
    /// An explicit id must already exist. A contact address reuses the
    /// matching record or creates one; losing a concurrent create race
    /// resolves by re-reading, so two first-time contributions from the
    /// same address converge on a single record.
    async fn resolve_investor(
        &self,
        budget: &Budget,
        party: InvestorParty,
    ) -> LoanResult<Investor> {
        match party {
            InvestorParty::ById(id) => bounded(budget, self.store.get_investor(&id))
                .await?
                .ok_or_else(|| LoanError::NotFound(format!("investor {} not found", id))),
            InvestorParty::ByEmail { name, email } => {
                if let Some(existing) =
                    bounded(budget, self.store.find_investor_by_email(&email)).await?
                {
                    return Ok(existing);
                }
                let candidate = Investor {
                    id: InvestorId::generate(),
                    name,
                    email: Some(email.clone()),
                    created_at: Utc::now(),
                };
                match self.store.create_investor(&candidate).await {
                    Ok(()) => Ok(candidate),
                    Err(StorageError::Conflict(_)) => {
                        bounded(budget, self.store.find_investor_by_email(&email))
                            .await?
                            .ok_or_else(|| {
                                LoanError::Storage(StorageError::Backend(format!(
                                    "investor with email {} conflicted but is not readable",
                                    email
                                )))
                            })
                    }
                    Err(err) => Err(err.into()),
                }
            }
        }
    }
}
