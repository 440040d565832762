#![allow(dead_code)]

use crate::types::{Contract, ContractStatus};

/// INV-1: Penalty split identity — the deposit is exactly three penalty
/// tranches plus the reserved remainder.
pub fn assert_penalty_split(contract: &Contract) {
    let t = &contract.terms;
    assert_eq!(
        3 * t.violation_penalty + t.remainder_amount,
        t.amount,
        "INV-1 violated: contract {}: 3*{} + {} != {}",
        t.id,
        t.violation_penalty,
        t.remainder_amount,
        t.amount
    );
}

/// INV-2: Accumulated penalty bounds — never negative, never more than
/// the deposit.
pub fn assert_penalty_bounds(contract: &Contract) {
    let p = contract.state.accumulated_penalty;
    assert!(
        (0..=contract.terms.amount).contains(&p),
        "INV-2 violated: contract {}: accumulated_penalty {} outside 0..={}",
        contract.terms.id,
        p,
        contract.terms.amount
    );
}

/// INV-3: Remaining balance is always `amount - accumulated_penalty`
/// once the contract is active, and never negative.
pub fn assert_remaining_consistent(contract: &Contract) {
    let s = &contract.state;
    if s.status == ContractStatus::Pending {
        assert_eq!(
            s.remaining_amount, 0,
            "INV-3 violated: pending contract {} has a non-zero remaining balance",
            contract.terms.id
        );
        return;
    }
    assert_eq!(
        s.remaining_amount,
        contract.terms.amount - s.accumulated_penalty,
        "INV-3 violated: contract {}: remaining {} != {} - {}",
        contract.terms.id,
        s.remaining_amount,
        contract.terms.amount,
        s.accumulated_penalty
    );
    assert!(
        s.remaining_amount >= 0,
        "INV-3 violated: contract {} has negative remaining balance",
        contract.terms.id
    );
}

/// INV-4: Accumulated penalty is monotonically non-decreasing.
pub fn assert_penalty_monotonic(penalty_before: i64, penalty_after: i64) {
    assert!(
        penalty_after >= penalty_before,
        "INV-4 violated: accumulated_penalty decreased from {} to {}",
        penalty_before,
        penalty_after
    );
}

/// INV-5: Terms immutability — no operation after creation may change
/// the agreed terms.
pub fn assert_terms_immutable(original: &Contract, current: &Contract) {
    assert_eq!(
        original.terms, current.terms,
        "INV-5 violated: contract terms changed after creation"
    );
}

/// INV-6: Status transition validity. Only forward transitions are
/// allowed:
///   Pending -> Active
///   Active  -> Completed | ViolatedTerminated | Refunded
///   terminal states -> (none)
pub fn assert_valid_status_transition(from: ContractStatus, to: ContractStatus) {
    let valid = from == to
        || matches!(
            (from, to),
            (ContractStatus::Pending, ContractStatus::Active)
                | (ContractStatus::Active, ContractStatus::Completed)
                | (ContractStatus::Active, ContractStatus::ViolatedTerminated)
                | (ContractStatus::Active, ContractStatus::Refunded)
        );

    assert!(
        valid,
        "INV-6 violated: invalid status transition from {:?} to {:?}",
        from, to
    );
}

/// INV-7: Day counters never exceed the contract window length.
pub fn assert_day_counters_bounded(contract: &Contract) {
    let days = contract.state.completed_days + contract.state.violation_days;
    assert!(
        days <= u32::from(contract.terms.duration_days),
        "INV-7 violated: contract {}: {} outcomes recorded for a {}-day window",
        contract.terms.id,
        days,
        contract.terms.duration_days
    );
}

/// INV-8: Refund bounds — a recorded refund is never negative and never
/// exceeds the original deposit.
pub fn assert_refund_bounded(contract: &Contract) {
    if let Some(refund) = contract.state.refund_amount {
        assert!(
            (0..=contract.terms.amount).contains(&refund),
            "INV-8 violated: contract {}: refund {} outside 0..={}",
            contract.terms.id,
            refund,
            contract.terms.amount
        );
    }
}

/// Run all stateless contract invariants.
pub fn assert_all_contract_invariants(contract: &Contract) {
    assert_penalty_split(contract);
    assert_penalty_bounds(contract);
    assert_remaining_consistent(contract);
    assert_day_counters_bounded(contract);
    assert_refund_bounded(contract);
}
