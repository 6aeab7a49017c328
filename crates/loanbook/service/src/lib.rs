//! Loanbook lifecycle orchestrator.
//!
//! The service tracks each loan through its irreversible lifecycle
//! (`proposed → approved → invested → disbursed`), enforces who may
//! advance each stage, and guarantees that the sum of contributions
//! toward a loan never exceeds its principal, even under concurrent
//! contribution attempts.
//!
//! Entry points are the four mutating intents plus two queries on
//! [`LoanService`]; persistence is consumed through the
//! [`loanbook_storage::LoanStore`] port.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
mod locks;
mod notify;
mod service;

pub use error::{LoanError, LoanResult};
pub use notify::{FundingNotifier, LogNotifier, NotifyError};
pub use service::{LoanService, ServiceConfig};
