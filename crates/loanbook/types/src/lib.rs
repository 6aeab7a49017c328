//! Loanbook domain model.
//!
//! A loan moves forward through a fixed lifecycle and never backwards:
//! `proposed → approved → invested → disbursed`. The `invested` step is
//! entered automatically by the investment ledger when contributions
//! reach the principal exactly; the other transitions are recorded by
//! explicit staff actions.
//!
//! Monetary amounts are integer **minor units** (`i64`), so ledger sums
//! and the equality-triggered funding promotion stay exact.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanId(pub String);

impl LoanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvestorId(pub String);

impl InvestorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for InvestorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvestmentId(pub String);

impl InvestmentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisbursementId(pub String);

impl DisbursementId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Lifecycle state of a loan. The derived ordering follows the
/// lifecycle, so `state >= LoanState::Invested` means "fully funded or
/// beyond".
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    Proposed,
    Approved,
    Invested,
    Disbursed,
}

impl LoanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Proposed => "proposed",
            LoanState::Approved => "approved",
            LoanState::Invested => "invested",
            LoanState::Disbursed => "disbursed",
        }
    }
}

impl std::fmt::Display for LoanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The central aggregate. `approval`, `investments`, and `disbursement`
/// are projections preloaded by the persistence port; they are never
/// written through directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower_id: String,
    /// Target funding amount in minor units; the ceiling the ledger
    /// enforces.
    pub principal_minor: i64,
    pub rate: f64,
    pub roi: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_letter_url: Option<String>,
    pub state: LoanState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub investments: Vec<Investment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursement: Option<Disbursement>,
}

/// Create intent for a new loan. Identity, state, and timestamps are
/// assigned by the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoanDraft {
    pub borrower_id: String,
    pub principal_minor: i64,
    pub rate: f64,
    pub roi: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_letter_url: Option<String>,
}

/// One-time field-validation record unlocking funding. At most one per
/// loan; created once, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub loan_id: LoanId,
    pub picture_proof_url: String,
    pub employee_id: String,
    pub approval_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A party contributing funds. Email is the idempotent-lookup key: the
/// same address always resolves to the same record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Investor {
    pub id: InvestorId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One funding event from one investor toward one loan. Append-only:
/// repeated contributions produce multiple rows, never merges.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub loan_id: LoanId,
    pub investor_id: InvestorId,
    pub amount_minor: i64,
    pub created_at: DateTime<Utc>,
}

/// Final hand-off record. At most one per loan; created once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Disbursement {
    pub id: DisbursementId,
    pub loan_id: LoanId,
    pub agreement_url: String,
    pub employee_id: String,
    pub disbursement_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// How a contribution identifies its investor. The request layer turns
/// its loose optional fields into this union before the ledger runs, so
/// the ledger's contract stays strongly typed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum InvestorParty {
    /// An existing investor; must already be on record.
    ById(InvestorId),
    /// Resolve by contact address: reuse a matching record, create one
    /// otherwise.
    ByEmail {
        name: Option<String>,
        email: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_states_are_ordered() {
        assert!(LoanState::Proposed < LoanState::Approved);
        assert!(LoanState::Approved < LoanState::Invested);
        assert!(LoanState::Invested < LoanState::Disbursed);
    }

    #[test]
    fn state_display_matches_wire_values() {
        assert_eq!(LoanState::Proposed.to_string(), "proposed");
        assert_eq!(LoanState::Disbursed.to_string(), "disbursed");
        assert_eq!(
            serde_json::to_string(&LoanState::Invested).unwrap(),
            "\"invested\""
        );
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(LoanId::generate(), LoanId::generate());
        assert_ne!(InvestorId::generate(), InvestorId::generate());
    }

    #[test]
    fn loan_serializes_without_empty_projections() {
        let loan = Loan {
            id: LoanId::new("loan-1"),
            borrower_id: "borrower-1".to_string(),
            principal_minor: 1_000_000,
            rate: 0.1,
            roi: 0.08,
            agreement_letter_url: None,
            state: LoanState::Proposed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            approval: None,
            investments: vec![],
            disbursement: None,
        };
        let json = serde_json::to_value(&loan).unwrap();
        assert!(json.get("approval").is_none());
        assert!(json.get("investments").is_none());
        assert_eq!(json["state"], "proposed");
    }
}
