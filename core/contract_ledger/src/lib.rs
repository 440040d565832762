//! # FitStake Contract Ledger
//!
//! Core crate of the FitStake commitment service. It owns the full
//! lifecycle of a deposit-backed commitment contract:
//!
//! | Phase        | Operation(s)                                  |
//! |--------------|-----------------------------------------------|
//! | Creation     | [`ledger::create`]                            |
//! | Activation   | [`ledger::confirm_payment`]                   |
//! | Daily accrual| [`ledger::record_daily_outcome`], [`ledger::day_outcome`] |
//! | Settlement   | [`ledger::settle`]                            |
//!
//! ## Architecture
//!
//! The crate is deliberately free of I/O: every operation is a pure
//! function over [`ContractTerms`] (immutable after creation) and
//! [`ContractState`] (the mutable counters and status). The host decides
//! how terms and state are persisted and is responsible for making each
//! operation atomic per contract; duplicate-date detection in particular
//! relies on a storage-level unique constraint, with [`Error::DuplicateOutcome`]
//! as the agreed error shape.
//!
//! All money values are integer currency units. Penalty division always
//! truncates, and the remainder is tracked explicitly in the terms rather
//! than discarded, so `3 * violation_penalty + remainder_amount == amount`
//! holds for every contract.

use chrono::NaiveDate;
use thiserror::Error;

pub mod ledger;
mod types;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_lifecycle;

pub use ledger::{
    day_outcome, NewContract, OutcomeSummary, PaymentUpdate, Settlement, SettlementKind,
};
pub use types::{
    Contract, ContractState, ContractStatus, ContractTerms, PaymentStatus, PlanType, TaskKind,
};

/// Errors produced by ledger operations.
///
/// `DuplicateOutcome` is owned here but raised by the persistence layer,
/// which is the only place that can see two writes for the same date.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad input at creation or an out-of-window date.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation attempted against a contract not in the required
    /// lifecycle state.
    #[error("invalid contract state: {0}")]
    InvalidState(String),

    /// An outcome was already recorded for this calendar date.
    #[error("outcome already recorded for {0}")]
    DuplicateOutcome(NaiveDate),

    /// The payment gateway reported a failure for this deposit.
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// No contract with this id exists.
    #[error("contract {0} not found")]
    NotFound(i64),
}

pub type Result<T> = std::result::Result<T, Error>;
