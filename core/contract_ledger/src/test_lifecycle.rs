use chrono::{Days, NaiveDate};

use crate::invariants;
use crate::ledger::{self, NewContract, PaymentUpdate, SettlementKind};
use crate::types::{Contract, ContractStatus, PaymentStatus, PlanType, TaskKind};
use crate::Error;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn start() -> NaiveDate {
    date(2026, 3, 1)
}

fn create(plan: PlanType, amount: Option<i64>, duration_days: u16) -> crate::Result<Contract> {
    ledger::create(
        NewContract {
            user_id: 42,
            plan,
            amount,
            duration_days,
            daily_tasks: vec![],
        },
        start(),
        "txn-abc".to_string(),
    )
}

fn pending() -> Contract {
    create(PlanType::Custom, Some(600), 30).unwrap()
}

fn active() -> Contract {
    let mut contract = pending();
    ledger::confirm_payment(&contract.terms, &mut contract.state, "txn-abc", true).unwrap();
    contract
}

// ─────────────────────────────────────────────────────────
// Creation
// ─────────────────────────────────────────────────────────

#[test]
fn test_created_contract_is_pending_with_nothing_at_risk() {
    let contract = pending();

    assert_eq!(contract.state.status, ContractStatus::Pending);
    assert_eq!(contract.state.payment_status, PaymentStatus::Pending);
    assert_eq!(contract.state.completed_days, 0);
    assert_eq!(contract.state.violation_days, 0);
    assert_eq!(contract.state.remaining_amount, 0);
    assert_eq!(contract.terms.end_date, start() + Days::new(30));
    assert_eq!(contract.terms.daily_tasks, TaskKind::ALL.to_vec());
    invariants::assert_all_contract_invariants(&contract);
}

#[test]
fn test_unsupported_duration_rejected() {
    let err = create(PlanType::Standard, None, 14).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_custom_amount_bounds_enforced() {
    assert!(matches!(
        create(PlanType::Custom, Some(99), 30).unwrap_err(),
        Error::Validation(_)
    ));
    assert!(matches!(
        create(PlanType::Custom, Some(10_000), 30).unwrap_err(),
        Error::Validation(_)
    ));
    assert!(create(PlanType::Custom, Some(100), 30).is_ok());
    assert!(create(PlanType::Custom, Some(9999), 30).is_ok());
}

#[test]
fn test_custom_plan_requires_amount() {
    let err = create(PlanType::Custom, None, 30).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_fixed_plans_reject_explicit_amount() {
    let err = create(PlanType::HighCommitment, Some(500), 30).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_duplicate_daily_tasks_rejected() {
    let err = ledger::create(
        NewContract {
            user_id: 42,
            plan: PlanType::Standard,
            amount: None,
            duration_days: 21,
            daily_tasks: vec![TaskKind::Workout, TaskKind::Workout],
        },
        start(),
        "txn-abc".to_string(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

// ─────────────────────────────────────────────────────────
// Payment confirmation
// ─────────────────────────────────────────────────────────

#[test]
fn test_payment_success_activates_contract() {
    let mut contract = pending();
    let update =
        ledger::confirm_payment(&contract.terms, &mut contract.state, "txn-abc", true).unwrap();

    assert_eq!(update, PaymentUpdate::Activated);
    assert_eq!(contract.state.status, ContractStatus::Active);
    assert_eq!(contract.state.payment_status, PaymentStatus::Paid);
    assert_eq!(contract.state.remaining_amount, 600);
    invariants::assert_valid_status_transition(ContractStatus::Pending, ContractStatus::Active);
}

#[test]
fn test_payment_callback_replay_is_a_noop() {
    let mut contract = active();
    let snapshot = contract.state.clone();

    let update =
        ledger::confirm_payment(&contract.terms, &mut contract.state, "txn-abc", true).unwrap();

    assert_eq!(update, PaymentUpdate::AlreadyProcessed);
    assert_eq!(contract.state, snapshot);
}

#[test]
fn test_payment_callback_with_unknown_reference_rejected() {
    let mut contract = pending();
    let err = ledger::confirm_payment(&contract.terms, &mut contract.state, "txn-other", true)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(contract.state.status, ContractStatus::Pending);
}

#[test]
fn test_payment_failure_keeps_contract_pending_and_retryable() {
    let mut contract = pending();

    let update =
        ledger::confirm_payment(&contract.terms, &mut contract.state, "txn-abc", false).unwrap();
    assert_eq!(update, PaymentUpdate::Failed);
    assert_eq!(contract.state.status, ContractStatus::Pending);
    assert_eq!(contract.state.payment_status, PaymentStatus::Failed);
    assert_eq!(contract.state.remaining_amount, 0);

    // A resubmitted charge may still succeed.
    let update =
        ledger::confirm_payment(&contract.terms, &mut contract.state, "txn-abc", true).unwrap();
    assert_eq!(update, PaymentUpdate::Activated);
    assert_eq!(contract.state.status, ContractStatus::Active);
}

// ─────────────────────────────────────────────────────────
// Daily outcomes
// ─────────────────────────────────────────────────────────

#[test]
fn test_outcome_on_pending_contract_rejected() {
    let mut contract = pending();
    let err = ledger::record_daily_outcome(&contract.terms, &mut contract.state, start(), true)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_outcome_outside_window_rejected() {
    let mut contract = active();

    let before = ledger::record_daily_outcome(
        &contract.terms,
        &mut contract.state,
        start() - Days::new(1),
        true,
    )
    .unwrap_err();
    assert!(matches!(before, Error::Validation(_)));

    // end_date itself is already outside the half-open window.
    let at_end = ledger::record_daily_outcome(
        &contract.terms,
        &mut contract.state,
        contract.terms.end_date,
        true,
    )
    .unwrap_err();
    assert!(matches!(at_end, Error::Validation(_)));

    assert_eq!(contract.state.completed_days, 0);
    assert_eq!(contract.state.violation_days, 0);
}

#[test]
fn test_day_outcome_requires_every_task() {
    let required = [TaskKind::Breakfast, TaskKind::Workout];

    assert!(ledger::day_outcome(
        &required,
        &[TaskKind::Workout, TaskKind::Breakfast]
    ));
    assert!(!ledger::day_outcome(&required, &[TaskKind::Breakfast]));
    assert!(!ledger::day_outcome(&required, &[]));
    // Extra completions beyond the required set are harmless.
    assert!(ledger::day_outcome(
        &required,
        &[TaskKind::Breakfast, TaskKind::Workout, TaskKind::Dinner]
    ));
}

#[test]
fn test_outcome_after_forced_termination_rejected() {
    let mut contract = active();

    // 600 splits into three tranches of 200; three violations deplete it.
    for day in 0..3 {
        ledger::record_daily_outcome(
            &contract.terms,
            &mut contract.state,
            start() + Days::new(day),
            false,
        )
        .unwrap();
    }
    assert_eq!(contract.state.status, ContractStatus::ViolatedTerminated);

    let err = ledger::record_daily_outcome(
        &contract.terms,
        &mut contract.state,
        start() + Days::new(3),
        true,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

// ─────────────────────────────────────────────────────────
// Settlement
// ─────────────────────────────────────────────────────────

#[test]
fn test_expiry_settlement_before_end_date_rejected() {
    let mut contract = active();
    let err = ledger::settle(
        &contract.terms,
        &mut contract.state,
        contract.terms.end_date - Days::new(1),
        SettlementKind::Expiry,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(contract.state.status, ContractStatus::Active);
}

#[test]
fn test_settlement_on_pending_contract_rejected() {
    let mut contract = pending();
    let err = ledger::settle(
        &contract.terms,
        &mut contract.state,
        contract.terms.end_date,
        SettlementKind::Expiry,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_early_termination_refunds_remaining_plus_remainder() {
    let mut contract = active();

    ledger::record_daily_outcome(&contract.terms, &mut contract.state, start(), false).unwrap();
    assert_eq!(contract.state.remaining_amount, 400);

    let settlement = ledger::settle(
        &contract.terms,
        &mut contract.state,
        start() + Days::new(5),
        SettlementKind::UserTermination,
    )
    .unwrap();

    assert_eq!(settlement.status, ContractStatus::Refunded);
    assert_eq!(settlement.refund_amount, 400);
    invariants::assert_valid_status_transition(ContractStatus::Active, ContractStatus::Refunded);
}

#[test]
fn test_early_termination_with_zero_violations_refunds_exactly_the_deposit() {
    let mut contract = create(PlanType::Custom, Some(500), 30).unwrap();
    ledger::confirm_payment(&contract.terms, &mut contract.state, "txn-abc", true).unwrap();

    let settlement = ledger::settle(
        &contract.terms,
        &mut contract.state,
        start() + Days::new(5),
        SettlementKind::UserTermination,
    )
    .unwrap();

    // The reserved remainder is still inside the untouched balance.
    assert_eq!(settlement.refund_amount, 500);
    assert_eq!(contract.state.refund_amount, Some(500));
    invariants::assert_all_contract_invariants(&contract);
}

#[test]
fn test_settled_contract_is_immutable() {
    let mut contract = active();
    ledger::settle(
        &contract.terms,
        &mut contract.state,
        contract.terms.end_date,
        SettlementKind::Expiry,
    )
    .unwrap();
    let snapshot = contract.clone();

    let record_err =
        ledger::record_daily_outcome(&contract.terms, &mut contract.state, start(), true)
            .unwrap_err();
    assert!(matches!(record_err, Error::InvalidState(_)));

    let settle_err = ledger::settle(
        &contract.terms,
        &mut contract.state,
        contract.terms.end_date,
        SettlementKind::Expiry,
    )
    .unwrap_err();
    assert!(matches!(settle_err, Error::InvalidState(_)));

    assert_eq!(contract, snapshot);
    invariants::assert_all_contract_invariants(&contract);
}
