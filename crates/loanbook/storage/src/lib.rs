//! Loanbook persistence port.
//!
//! This crate defines the storage contract the lifecycle core consumes:
//! - loan aggregates with their approval/investments/disbursement preloaded
//! - one-row-per-event writers for approvals, investments, disbursements
//! - investor lookup by id and by contact address
//! - the recomputed per-loan investment total
//!
//! Design stance:
//! - The core never sees a concrete engine; a transactional backend slots
//!   in behind [`LoanStore`].
//! - "Not found" on reads is a non-error `Ok(None)`, distinct from
//!   transport/storage failures.
//! - Uniqueness rules (one approval/disbursement per loan, one investor
//!   per email) live at this boundary so duplicate-submission guards stay
//!   race-tolerant.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::LoanStore;
