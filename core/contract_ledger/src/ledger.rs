//! # Ledger operations
//!
//! The four lifecycle operations of a commitment contract, plus the
//! helper that derives a day's boolean outcome from its per-task
//! check-in records.
//!
//! Every function here is pure: it validates, mutates the passed-in
//! [`ContractState`], and returns a summary of what changed. The host is
//! responsible for persisting terms and state atomically per contract.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::{
    Contract, ContractState, ContractStatus, ContractTerms, PaymentStatus, PlanType, TaskKind,
};
use crate::{Error, Result};

/// Contract durations offered to users, in days.
pub const SUPPORTED_DURATIONS: [u16; 3] = [21, 30, 60];

/// Bounds for the caller-chosen deposit on custom plans.
pub const CUSTOM_AMOUNT_MIN: i64 = 100;
pub const CUSTOM_AMOUNT_MAX: i64 = 9999;

/// The deposit is split into three equal penalty tranches; the division
/// remainder is reserved and always refunded.
pub const PENALTY_DIVISOR: i64 = 3;

// ─────────────────────────────────────────────────────────
// Creation
// ─────────────────────────────────────────────────────────

/// Validated request to open a new contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
    pub user_id: i64,
    pub plan: PlanType,
    /// Required for `Custom` plans; must be absent otherwise.
    pub amount: Option<i64>,
    pub duration_days: u16,
    /// Empty means "all task kinds".
    pub daily_tasks: Vec<TaskKind>,
}

/// Open a new contract in `Pending` status.
///
/// Computes the penalty split (`violation_penalty = amount / 3`,
/// `remainder_amount = amount % 3`), zeroes all counters, and leaves
/// `remaining_amount` at 0 until the payment callback confirms the
/// deposit. The returned contract has `id = 0`; the persistence layer
/// assigns the real identifier on insert.
pub fn create(req: NewContract, start_date: NaiveDate, transaction_ref: String) -> Result<Contract> {
    if !SUPPORTED_DURATIONS.contains(&req.duration_days) {
        return Err(Error::Validation(format!(
            "unsupported duration {} (expected one of {:?})",
            req.duration_days, SUPPORTED_DURATIONS
        )));
    }

    let amount = resolve_amount(req.plan, req.amount)?;

    let daily_tasks = if req.daily_tasks.is_empty() {
        TaskKind::ALL.to_vec()
    } else {
        for (i, t) in req.daily_tasks.iter().enumerate() {
            if req.daily_tasks[..i].contains(t) {
                return Err(Error::Validation(format!(
                    "duplicate daily task {}",
                    t.as_str()
                )));
            }
        }
        req.daily_tasks
    };

    let end_date = start_date
        .checked_add_days(Days::new(u64::from(req.duration_days)))
        .ok_or_else(|| Error::Validation("contract window overflows the calendar".into()))?;

    let terms = ContractTerms {
        id: 0,
        user_id: req.user_id,
        plan: req.plan,
        amount,
        start_date,
        end_date,
        duration_days: req.duration_days,
        daily_tasks,
        violation_penalty: amount / PENALTY_DIVISOR,
        remainder_amount: amount % PENALTY_DIVISOR,
        transaction_ref,
    };

    let state = ContractState {
        status: ContractStatus::Pending,
        payment_status: PaymentStatus::Pending,
        completed_days: 0,
        violation_days: 0,
        accumulated_penalty: 0,
        // Nothing is at risk until the gateway confirms the deposit.
        remaining_amount: 0,
        refund_amount: None,
    };

    Ok(Contract::from_parts(terms, state))
}

fn resolve_amount(plan: PlanType, requested: Option<i64>) -> Result<i64> {
    match (plan.default_amount(), requested) {
        (Some(default), None) => Ok(default),
        (Some(_), Some(_)) => Err(Error::Validation(format!(
            "amount may not be supplied for the {} plan",
            plan.as_str()
        ))),
        (None, None) => Err(Error::Validation(
            "custom plans require an explicit amount".into(),
        )),
        (None, Some(amount)) => {
            if !(CUSTOM_AMOUNT_MIN..=CUSTOM_AMOUNT_MAX).contains(&amount) {
                return Err(Error::Validation(format!(
                    "custom amount {amount} outside {CUSTOM_AMOUNT_MIN}..={CUSTOM_AMOUNT_MAX}"
                )));
            }
            Ok(amount)
        }
    }
}

// ─────────────────────────────────────────────────────────
// Payment confirmation
// ─────────────────────────────────────────────────────────

/// Result of applying a payment-gateway callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentUpdate {
    /// Deposit confirmed; contract is now `Active`.
    Activated,
    /// Replay of an already-confirmed transaction reference; no change.
    AlreadyProcessed,
    /// Gateway reported failure; contract stays `Pending`, eligible for
    /// retry or deletion.
    Failed,
}

/// Apply the payment gateway's verdict for the deposit charge.
///
/// At-most-once activation: once `payment_status` is `Paid`, replays of
/// the same transaction reference return [`PaymentUpdate::AlreadyProcessed`]
/// without touching the state. A reference that does not match the one
/// recorded at creation is rejected outright.
pub fn confirm_payment(
    terms: &ContractTerms,
    state: &mut ContractState,
    transaction_ref: &str,
    success: bool,
) -> Result<PaymentUpdate> {
    if transaction_ref != terms.transaction_ref {
        return Err(Error::Validation(format!(
            "transaction reference {transaction_ref:?} does not belong to contract {}",
            terms.id
        )));
    }

    if state.payment_status == PaymentStatus::Paid {
        return Ok(PaymentUpdate::AlreadyProcessed);
    }

    if state.status != ContractStatus::Pending {
        return Err(Error::InvalidState(format!(
            "payment callback for contract in status {:?}",
            state.status.as_str()
        )));
    }

    if success {
        state.payment_status = PaymentStatus::Paid;
        state.status = ContractStatus::Active;
        state.remaining_amount = terms.amount;
        Ok(PaymentUpdate::Activated)
    } else {
        state.payment_status = PaymentStatus::Failed;
        Ok(PaymentUpdate::Failed)
    }
}

// ─────────────────────────────────────────────────────────
// Daily outcomes
// ─────────────────────────────────────────────────────────

/// Updated counters after a daily outcome, returned to the caller for
/// display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    pub date: NaiveDate,
    pub all_tasks_completed: bool,
    pub completed_days: u32,
    pub violation_days: u32,
    pub accumulated_penalty: i64,
    pub remaining_amount: i64,
    /// True when this outcome depleted the deposit and force-terminated
    /// the contract.
    pub terminated: bool,
    /// The remainder refund due immediately on forced termination.
    pub refund_due: Option<i64>,
}

/// Derive the boolean daily outcome from the check-in recorder's
/// per-task completion records for one calendar date.
pub fn day_outcome(required: &[TaskKind], completed: &[TaskKind]) -> bool {
    required.iter().all(|t| completed.contains(t))
}

/// Record the outcome of one calendar day against an active contract.
///
/// A violation deducts `violation_penalty`, capped so the accumulated
/// penalty never exceeds the deposit. When `remaining_amount` reaches 0
/// the contract is force-terminated on the spot (`ViolatedTerminated`)
/// and the reserved remainder becomes the refund due.
///
/// Duplicate dates cannot be detected here; the host must enforce the
/// at-most-one-outcome-per-day rule with a storage unique constraint and
/// surface [`Error::DuplicateOutcome`].
pub fn record_daily_outcome(
    terms: &ContractTerms,
    state: &mut ContractState,
    date: NaiveDate,
    all_tasks_completed: bool,
) -> Result<OutcomeSummary> {
    match state.status {
        ContractStatus::Active => {}
        ContractStatus::Pending => {
            return Err(Error::InvalidState(
                "contract is pending payment confirmation".into(),
            ))
        }
        terminal => {
            return Err(Error::InvalidState(format!(
                "contract already {}",
                terminal.as_str()
            )))
        }
    }

    if date < terms.start_date || date >= terms.end_date {
        return Err(Error::Validation(format!(
            "date {date} outside contract window {}..{}",
            terms.start_date, terms.end_date
        )));
    }

    let mut terminated = false;
    let mut refund_due = None;

    if all_tasks_completed {
        state.completed_days += 1;
    } else {
        state.violation_days += 1;
        state.accumulated_penalty =
            (state.accumulated_penalty + terms.violation_penalty).min(terms.amount);
        state.remaining_amount = terms.amount - state.accumulated_penalty;

        if state.remaining_amount == 0 {
            // Deposit depleted: nothing left at stake, terminate now and
            // return the reserved remainder.
            state.status = ContractStatus::ViolatedTerminated;
            state.refund_amount = Some(terms.remainder_amount);
            terminated = true;
            refund_due = Some(terms.remainder_amount);
        }
    }

    Ok(OutcomeSummary {
        date,
        all_tasks_completed,
        completed_days: state.completed_days,
        violation_days: state.violation_days,
        accumulated_penalty: state.accumulated_penalty,
        remaining_amount: state.remaining_amount,
        terminated,
        refund_due,
    })
}

// ─────────────────────────────────────────────────────────
// Settlement
// ─────────────────────────────────────────────────────────

/// Why a contract is being settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettlementKind {
    /// The contract window closed (`as_of >= end_date`).
    Expiry,
    /// The owner terminated the contract early.
    UserTermination,
}

/// Terminal accounting result returned by [`settle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub status: ContractStatus,
    /// Amount returned to the user: `remaining_amount + remainder_amount`,
    /// capped at `amount`.
    pub refund_amount: i64,
}

/// Close out an active contract and compute the refund.
///
/// Expiry settlement transitions to `Completed`; early user termination
/// transitions to `Refunded`. Either way penalties already applied
/// stand and the reserved remainder is returned. The remainder sits
/// inside `remaining_amount` until penalties consume it, so the sum is
/// capped at the deposit — a zero-violation contract refunds exactly
/// `amount`, never more. A settled contract is immutable; further
/// operations fail with `InvalidState`.
pub fn settle(
    terms: &ContractTerms,
    state: &mut ContractState,
    as_of: NaiveDate,
    kind: SettlementKind,
) -> Result<Settlement> {
    match state.status {
        ContractStatus::Active => {}
        ContractStatus::Pending => {
            return Err(Error::InvalidState(
                "contract is pending payment confirmation".into(),
            ))
        }
        terminal => {
            return Err(Error::InvalidState(format!(
                "contract already {}",
                terminal.as_str()
            )))
        }
    }

    let status = match kind {
        SettlementKind::Expiry => {
            if as_of < terms.end_date {
                return Err(Error::Validation(format!(
                    "contract window still open until {}",
                    terms.end_date
                )));
            }
            ContractStatus::Completed
        }
        SettlementKind::UserTermination => ContractStatus::Refunded,
    };

    let refund_amount = (state.remaining_amount + terms.remainder_amount).min(terms.amount);

    state.status = status;
    state.refund_amount = Some(refund_amount);

    Ok(Settlement {
        status,
        refund_amount,
    })
}
