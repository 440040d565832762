//! # Types
//!
//! Shared data structures for the commitment-contract ledger.
//!
//! ## Design decisions
//!
//! ### Terms / State split
//!
//! A `Contract` is handled internally as two separate pieces:
//!
//! - [`ContractTerms`] — written once at creation; never mutated.
//! - [`ContractState`] — written on payment confirmation, on every daily
//!   outcome, and at settlement.
//!
//! The public API exposes the combined [`Contract`] struct for convenience;
//! ledger operations take `&ContractTerms` and `&mut ContractState` so the
//! type system itself rules out edits to the agreed terms.
//!
//! ### Status as a Finite-State Machine
//!
//! [`ContractStatus`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! Pending ──► Active ──► Completed
//!                 ├─────► ViolatedTerminated
//!                 └─────► Refunded
//! ```
//!
//! `Completed`, `ViolatedTerminated` and `Refunded` are terminal; every
//! mutation against a terminal contract is rejected with `InvalidState`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Commitment plan chosen at creation.
///
/// Standard and high-commitment plans imply a fixed deposit; custom plans
/// carry a caller-chosen amount within [`crate::ledger::CUSTOM_AMOUNT_MIN`]
/// ..= [`crate::ledger::CUSTOM_AMOUNT_MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanType {
    Standard,
    HighCommitment,
    Custom,
}

impl PlanType {
    /// Default deposit for fixed plans; `None` for custom.
    pub fn default_amount(self) -> Option<i64> {
        match self {
            Self::Standard => Some(300),
            Self::HighCommitment => Some(1000),
            Self::Custom => None,
        }
    }

    /// Short identifier string suitable for storage in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::HighCommitment => "high-commitment",
            Self::Custom => "custom",
        }
    }

    /// Parse the stored identifier back into a [`PlanType`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "high-commitment" => Some(Self::HighCommitment),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// The fixed set of task kinds a contract may require each day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Breakfast,
    Lunch,
    Dinner,
    Workout,
    ProteinIntake,
}

impl TaskKind {
    /// Every supported task kind, in display order.
    pub const ALL: [TaskKind; 5] = [
        Self::Breakfast,
        Self::Lunch,
        Self::Dinner,
        Self::Workout,
        Self::ProteinIntake,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Workout => "workout",
            Self::ProteinIntake => "protein-intake",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "breakfast" => Some(Self::Breakfast),
            "lunch" => Some(Self::Lunch),
            "dinner" => Some(Self::Dinner),
            "workout" => Some(Self::Workout),
            "protein-intake" => Some(Self::ProteinIntake),
            _ => None,
        }
    }
}

/// Lifecycle status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractStatus {
    /// Created, awaiting deposit payment.
    Pending,
    /// Payment confirmed; accruing daily outcomes.
    Active,
    /// Reached `end_date` and settled; remaining balance refunded.
    Completed,
    /// Deposit depleted by violations; force-terminated.
    ViolatedTerminated,
    /// Terminated early by the user; remaining balance returned.
    Refunded,
}

impl ContractStatus {
    /// Terminal statuses admit no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::ViolatedTerminated | Self::Refunded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::ViolatedTerminated => "violated-terminated",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "violated-terminated" => Some(Self::ViolatedTerminated),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

/// Deposit payment status, written only by the payment-gateway callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Immutable contract terms, written once at creation.
///
/// `violation_penalty` and `remainder_amount` are derived from `amount` at
/// creation and never recomputed: `violation_penalty = amount / 3`
/// (truncating) and `remainder_amount = amount % 3`. The remainder is
/// reserved for return at settlement regardless of violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTerms {
    /// Unique identifier; `0` until the persistence layer assigns one.
    pub id: i64,
    /// Owning user; immutable after creation.
    pub user_id: i64,
    pub plan: PlanType,
    /// Deposit committed, in integer currency units.
    pub amount: i64,
    pub start_date: NaiveDate,
    /// Exclusive end of the contract window: `start_date + duration_days`.
    pub end_date: NaiveDate,
    pub duration_days: u16,
    /// Required task kinds per day; all must be completed to avoid a
    /// violation.
    pub daily_tasks: Vec<TaskKind>,
    /// Deduction per violation day, `amount / 3` truncating.
    pub violation_penalty: i64,
    /// `amount % 3`; always refunded at settlement.
    pub remainder_amount: i64,
    /// Payment-gateway correlation reference recorded at creation.
    pub transaction_ref: String,
}

/// Mutable contract state, updated by payment confirmation, daily
/// outcomes, and settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState {
    pub status: ContractStatus,
    pub payment_status: PaymentStatus,
    /// Days where every required task was completed. Incremented at most
    /// once per calendar day.
    pub completed_days: u32,
    /// Days with at least one missed task. Incremented at most once per
    /// calendar day.
    pub violation_days: u32,
    /// Running total of penalties deducted; never decreases, never
    /// exceeds `amount`.
    pub accumulated_penalty: i64,
    /// Deposit still at risk: `amount - accumulated_penalty`. Zero while
    /// payment is unconfirmed.
    pub remaining_amount: i64,
    /// Set exactly once, when the contract reaches a terminal status.
    pub refund_amount: Option<i64>,
}

/// Full contract record: the public API return type, reconstructed from
/// the split terms + state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    #[serde(flatten)]
    pub terms: ContractTerms,
    #[serde(flatten)]
    pub state: ContractState,
}

impl Contract {
    pub fn from_parts(terms: ContractTerms, state: ContractState) -> Self {
        Self { terms, state }
    }

    pub fn into_parts(self) -> (ContractTerms, ContractState) {
        (self.terms, self.state)
    }
}
