//! In-memory reference implementation of the loan persistence port.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use a transactional backend for source-of-truth data.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use loanbook_types::{Approval, Disbursement, Investment, Investor, InvestorId, Loan, LoanId};

use crate::traits::LoanStore;
use crate::{StorageError, StorageResult};

/// In-memory loan storage adapter.
///
/// Each table sits behind its own `RwLock`; the uniqueness guards
/// (approval/disbursement per loan, investor email) run inside a single
/// write-lock section so concurrent duplicate submissions surface as
/// `Conflict` rather than double rows.
#[derive(Default)]
pub struct InMemoryLoanStore {
    loans: RwLock<HashMap<LoanId, Loan>>,
    approvals: RwLock<HashMap<LoanId, Approval>>,
    investments: RwLock<Vec<Investment>>,
    disbursements: RwLock<HashMap<LoanId, Disbursement>>,
    investors: RwLock<HashMap<InvestorId, Investor>>,
}

impl InMemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn assemble(&self, mut loan: Loan) -> StorageResult<Loan> {
        loan.approval = self
            .approvals
            .read()
            .map_err(|_| StorageError::Backend("approvals lock poisoned".to_string()))?
            .get(&loan.id)
            .cloned();
        loan.investments = self
            .investments
            .read()
            .map_err(|_| StorageError::Backend("investments lock poisoned".to_string()))?
            .iter()
            .filter(|inv| inv.loan_id == loan.id)
            .cloned()
            .collect();
        loan.disbursement = self
            .disbursements
            .read()
            .map_err(|_| StorageError::Backend("disbursements lock poisoned".to_string()))?
            .get(&loan.id)
            .cloned();
        Ok(loan)
    }
}

#[async_trait]
impl LoanStore for InMemoryLoanStore {
    async fn create_loan(&self, loan: &Loan) -> StorageResult<()> {
        let mut guard = self
            .loans
            .write()
            .map_err(|_| StorageError::Backend("loans lock poisoned".to_string()))?;
        if guard.contains_key(&loan.id) {
            return Err(StorageError::Conflict(format!(
                "loan {} already exists",
                loan.id
            )));
        }
        guard.insert(loan.id.clone(), loan.clone());
        Ok(())
    }

    async fn get_loan(&self, id: &LoanId) -> StorageResult<Option<Loan>> {
        let base = {
            let guard = self
                .loans
                .read()
                .map_err(|_| StorageError::Backend("loans lock poisoned".to_string()))?;
            guard.get(id).cloned()
        };
        match base {
            Some(loan) => Ok(Some(self.assemble(loan)?)),
            None => Ok(None),
        }
    }

    async fn update_loan(&self, loan: &Loan) -> StorageResult<()> {
        let mut guard = self
            .loans
            .write()
            .map_err(|_| StorageError::Backend("loans lock poisoned".to_string()))?;
        let stored = guard
            .get_mut(&loan.id)
            .ok_or_else(|| StorageError::NotFound(format!("loan {} not found", loan.id)))?;
        stored.state = loan.state;
        stored.updated_at = loan.updated_at;
        stored.agreement_letter_url = loan.agreement_letter_url.clone();
        Ok(())
    }

    async fn list_loans(&self) -> StorageResult<Vec<Loan>> {
        let bases = {
            let guard = self
                .loans
                .read()
                .map_err(|_| StorageError::Backend("loans lock poisoned".to_string()))?;
            let mut values = guard.values().cloned().collect::<Vec<_>>();
            values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            values
        };
        bases.into_iter().map(|loan| self.assemble(loan)).collect()
    }

    async fn create_approval(&self, approval: &Approval) -> StorageResult<()> {
        let mut guard = self
            .approvals
            .write()
            .map_err(|_| StorageError::Backend("approvals lock poisoned".to_string()))?;
        if guard.contains_key(&approval.loan_id) {
            return Err(StorageError::Conflict(format!(
                "loan {} already has an approval",
                approval.loan_id
            )));
        }
        guard.insert(approval.loan_id.clone(), approval.clone());
        Ok(())
    }

    async fn create_investment(&self, investment: &Investment) -> StorageResult<()> {
        let mut guard = self
            .investments
            .write()
            .map_err(|_| StorageError::Backend("investments lock poisoned".to_string()))?;
        guard.push(investment.clone());
        Ok(())
    }

    async fn create_disbursement(&self, disbursement: &Disbursement) -> StorageResult<()> {
        let mut guard = self
            .disbursements
            .write()
            .map_err(|_| StorageError::Backend("disbursements lock poisoned".to_string()))?;
        if guard.contains_key(&disbursement.loan_id) {
            return Err(StorageError::Conflict(format!(
                "loan {} already has a disbursement",
                disbursement.loan_id
            )));
        }
        guard.insert(disbursement.loan_id.clone(), disbursement.clone());
        Ok(())
    }

    async fn create_investor(&self, investor: &Investor) -> StorageResult<()> {
        let mut guard = self
            .investors
            .write()
            .map_err(|_| StorageError::Backend("investors lock poisoned".to_string()))?;
        if let Some(email) = investor.email.as_deref() {
            if guard
                .values()
                .any(|existing| existing.email.as_deref() == Some(email))
            {
                return Err(StorageError::Conflict(format!(
                    "investor with email {} already exists",
                    email
                )));
            }
        }
        guard.insert(investor.id.clone(), investor.clone());
        Ok(())
    }

    async fn get_investor(&self, id: &InvestorId) -> StorageResult<Option<Investor>> {
        let guard = self
            .investors
            .read()
            .map_err(|_| StorageError::Backend("investors lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn find_investor_by_email(&self, email: &str) -> StorageResult<Option<Investor>> {
        let guard = self
            .investors
            .read()
            .map_err(|_| StorageError::Backend("investors lock poisoned".to_string()))?;
        Ok(guard
            .values()
            .find(|investor| investor.email.as_deref() == Some(email))
            .cloned())
    }

    async fn total_invested(&self, loan_id: &LoanId) -> StorageResult<i64> {
        let guard = self
            .investments
            .read()
            .map_err(|_| StorageError::Backend("investments lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|inv| &inv.loan_id == loan_id)
            .map(|inv| inv.amount_minor)
            .sum())
    }
}
