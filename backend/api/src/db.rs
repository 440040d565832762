//! Database layer — migrations, contract row codecs, and the writes
//! that carry the per-contract atomicity guarantees.
//!
//! Every contract mutation is an optimistic compare-and-swap on the
//! row's `revision` column; a stale revision surfaces as
//! [`ApiError::Conflict`]. The one-outcome-per-day rule is enforced by
//! the unique `(contract_id, day)` index on `daily_outcomes`, applied in
//! the same transaction as the state write.

use std::str::FromStr;

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use contract_ledger::{
    Contract, ContractState, ContractStatus, ContractTerms, Error as LedgerError, PaymentStatus,
    PlanType, TaskKind,
};

use crate::auth::AuthUser;
use crate::errors::{ApiError, Result};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)
        .map_err(sqlx::Error::from)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────

pub async fn find_user_by_token(pool: &SqlitePool, api_token: &str) -> Result<Option<AuthUser>> {
    let user = sqlx::query_as::<_, AuthUser>("SELECT id, email FROM users WHERE api_token = ?1")
        .bind(api_token)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

// ─────────────────────────────────────────────────────────
// Contract row codec
// ─────────────────────────────────────────────────────────

/// A contract as read back from the database, paired with the revision
/// the caller must present to write it again.
#[derive(Debug, Clone)]
pub struct StoredContract {
    pub contract: Contract,
    pub revision: i64,
}

#[derive(sqlx::FromRow)]
struct ContractRow {
    id: i64,
    user_id: i64,
    plan: String,
    amount: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    duration_days: i64,
    daily_tasks: String,
    violation_penalty: i64,
    remainder_amount: i64,
    transaction_ref: String,
    status: String,
    payment_status: String,
    completed_days: i64,
    violation_days: i64,
    accumulated_penalty: i64,
    remaining_amount: i64,
    refund_amount: Option<i64>,
    revision: i64,
}

const CONTRACT_COLUMNS: &str = "id, user_id, plan, amount, start_date, end_date, duration_days, \
     daily_tasks, violation_penalty, remainder_amount, transaction_ref, status, payment_status, \
     completed_days, violation_days, accumulated_penalty, remaining_amount, refund_amount, revision";

impl ContractRow {
    fn into_stored(self) -> Result<StoredContract> {
        let corrupt = |what: &str, value: &str| {
            ApiError::Corrupt(format!("contract {}: bad {what} {value:?}", self.id))
        };

        let plan = PlanType::parse(&self.plan).ok_or_else(|| corrupt("plan", &self.plan))?;
        let status =
            ContractStatus::parse(&self.status).ok_or_else(|| corrupt("status", &self.status))?;
        let payment_status = PaymentStatus::parse(&self.payment_status)
            .ok_or_else(|| corrupt("payment_status", &self.payment_status))?;
        let daily_tasks: Vec<TaskKind> = serde_json::from_str(&self.daily_tasks)
            .map_err(|_| corrupt("daily_tasks", &self.daily_tasks))?;
        let duration_days = u16::try_from(self.duration_days)
            .map_err(|_| corrupt("duration_days", &self.duration_days.to_string()))?;

        let terms = ContractTerms {
            id: self.id,
            user_id: self.user_id,
            plan,
            amount: self.amount,
            start_date: self.start_date,
            end_date: self.end_date,
            duration_days,
            daily_tasks,
            violation_penalty: self.violation_penalty,
            remainder_amount: self.remainder_amount,
            transaction_ref: self.transaction_ref,
        };
        let state = ContractState {
            status,
            payment_status,
            completed_days: self.completed_days as u32,
            violation_days: self.violation_days as u32,
            accumulated_penalty: self.accumulated_penalty,
            remaining_amount: self.remaining_amount,
            refund_amount: self.refund_amount,
        };

        Ok(StoredContract {
            contract: Contract::from_parts(terms, state),
            revision: self.revision,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Contract writes
// ─────────────────────────────────────────────────────────

/// Insert a freshly created contract and return its assigned id.
pub async fn insert_contract(pool: &SqlitePool, contract: &Contract) -> Result<i64> {
    let t = &contract.terms;
    let s = &contract.state;
    let daily_tasks = serde_json::to_string(&t.daily_tasks)
        .map_err(|e| ApiError::Corrupt(format!("daily_tasks encode: {e}")))?;

    let result = sqlx::query(
        r#"
        INSERT INTO contracts
            (user_id, plan, amount, start_date, end_date, duration_days, daily_tasks,
             violation_penalty, remainder_amount, transaction_ref, status, payment_status,
             completed_days, violation_days, accumulated_penalty, remaining_amount, refund_amount)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(t.user_id)
    .bind(t.plan.as_str())
    .bind(t.amount)
    .bind(t.start_date)
    .bind(t.end_date)
    .bind(i64::from(t.duration_days))
    .bind(daily_tasks)
    .bind(t.violation_penalty)
    .bind(t.remainder_amount)
    .bind(&t.transaction_ref)
    .bind(s.status.as_str())
    .bind(s.payment_status.as_str())
    .bind(i64::from(s.completed_days))
    .bind(i64::from(s.violation_days))
    .bind(s.accumulated_penalty)
    .bind(s.remaining_amount)
    .bind(s.refund_amount)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_contract(pool: &SqlitePool, id: i64) -> Result<Option<StoredContract>> {
    let row = sqlx::query_as::<_, ContractRow>(&format!(
        "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(ContractRow::into_stored).transpose()
}

/// Load a contract scoped to its owner. An unknown id and a foreign
/// owner are indistinguishable to the caller.
pub async fn get_contract_owned(pool: &SqlitePool, id: i64, user_id: i64) -> Result<StoredContract> {
    let stored = get_contract(pool, id)
        .await?
        .ok_or(LedgerError::NotFound(id))?;
    if stored.contract.terms.user_id != user_id {
        return Err(LedgerError::NotFound(id).into());
    }
    Ok(stored)
}

pub async fn get_contract_by_transaction_ref(
    pool: &SqlitePool,
    transaction_ref: &str,
) -> Result<Option<StoredContract>> {
    let row = sqlx::query_as::<_, ContractRow>(&format!(
        "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE transaction_ref = ?1"
    ))
    .bind(transaction_ref)
    .fetch_optional(pool)
    .await?;
    row.map(ContractRow::into_stored).transpose()
}

const UPDATE_STATE_SQL: &str = r#"
    UPDATE contracts
    SET    status = ?1, payment_status = ?2, completed_days = ?3, violation_days = ?4,
           accumulated_penalty = ?5, remaining_amount = ?6, refund_amount = ?7,
           revision = revision + 1
    WHERE  id = ?8 AND revision = ?9
"#;

/// Compare-and-swap write of the mutable contract state.
pub async fn update_state(
    pool: &SqlitePool,
    id: i64,
    expected_revision: i64,
    state: &ContractState,
) -> Result<()> {
    let rows = sqlx::query(UPDATE_STATE_SQL)
        .bind(state.status.as_str())
        .bind(state.payment_status.as_str())
        .bind(i64::from(state.completed_days))
        .bind(i64::from(state.violation_days))
        .bind(state.accumulated_penalty)
        .bind(state.remaining_amount)
        .bind(state.refund_amount)
        .bind(id)
        .bind(expected_revision)
        .execute(pool)
        .await?
        .rows_affected();

    if rows == 0 {
        return Err(ApiError::Conflict);
    }
    Ok(())
}

/// Point a pending contract at a fresh gateway transaction after a
/// failed charge, resetting payment status for the new attempt.
pub async fn reset_payment(
    pool: &SqlitePool,
    id: i64,
    expected_revision: i64,
    new_transaction_ref: &str,
) -> Result<()> {
    let rows = sqlx::query(
        r#"
        UPDATE contracts
        SET    transaction_ref = ?1, payment_status = 'pending', revision = revision + 1
        WHERE  id = ?2 AND revision = ?3
        "#,
    )
    .bind(new_transaction_ref)
    .bind(id)
    .bind(expected_revision)
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(ApiError::Conflict);
    }
    Ok(())
}

/// Remove a never-activated contract and its payment history.
pub async fn delete_contract(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM payment_transactions WHERE contract_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM contracts WHERE id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Payment transactions
// ─────────────────────────────────────────────────────────

pub async fn insert_payment_transaction(
    pool: &SqlitePool,
    transaction_ref: &str,
    contract_id: i64,
    amount: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payment_transactions (transaction_ref, contract_id, status, amount)
        VALUES (?1, ?2, 'initiated', ?3)
        "#,
    )
    .bind(transaction_ref)
    .bind(contract_id)
    .bind(amount)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_payment_processed(
    pool: &SqlitePool,
    transaction_ref: &str,
    status: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE payment_transactions
        SET    status = ?1, processed_at = strftime('%s', 'now')
        WHERE  transaction_ref = ?2
        "#,
    )
    .bind(status)
    .bind(transaction_ref)
    .execute(pool)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Check-ins and daily outcomes
// ─────────────────────────────────────────────────────────

/// Record one task-slot check-in. At most one record may exist per
/// (contract, day, task).
pub async fn insert_checkin(
    pool: &SqlitePool,
    contract_id: i64,
    day: NaiveDate,
    task: TaskKind,
    completed: bool,
) -> Result<()> {
    let result = sqlx::query(
        "INSERT INTO checkins (contract_id, day, task, completed) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(contract_id)
    .bind(day)
    .bind(task.as_str())
    .bind(completed)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(ApiError::Duplicate(format!(
            "check-in for {} on {day} already recorded",
            task.as_str()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Task kinds checked off as completed on the given day.
pub async fn completed_tasks_for_day(
    pool: &SqlitePool,
    contract_id: i64,
    day: NaiveDate,
) -> Result<Vec<TaskKind>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT task FROM checkins WHERE contract_id = ?1 AND day = ?2 AND completed = 1",
    )
    .bind(contract_id)
    .bind(day)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(task,)| {
            TaskKind::parse(&task)
                .ok_or_else(|| ApiError::Corrupt(format!("check-in: bad task {task:?}")))
        })
        .collect()
}

/// Whether the day's outcome has already been recorded, which freezes
/// its check-ins.
pub async fn outcome_exists(pool: &SqlitePool, contract_id: i64, day: NaiveDate) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM daily_outcomes WHERE contract_id = ?1 AND day = ?2")
            .bind(contract_id)
            .bind(day)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

/// Persist a daily outcome together with the resulting contract state.
///
/// The outcome insert and the state CAS run in one transaction: a second
/// writer for the same day loses on the unique index and gets
/// `DuplicateOutcome`; a writer holding a stale revision gets `Conflict`
/// and the outcome row rolls back with it.
pub async fn record_outcome(
    pool: &SqlitePool,
    contract_id: i64,
    expected_revision: i64,
    day: NaiveDate,
    all_completed: bool,
    state: &ContractState,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO daily_outcomes (contract_id, day, all_completed) VALUES (?1, ?2, ?3)",
    )
    .bind(contract_id)
    .bind(day)
    .bind(all_completed)
    .execute(&mut *tx)
    .await;

    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return Err(LedgerError::DuplicateOutcome(day).into());
        }
        return Err(e.into());
    }

    let rows = sqlx::query(UPDATE_STATE_SQL)
        .bind(state.status.as_str())
        .bind(state.payment_status.as_str())
        .bind(i64::from(state.completed_days))
        .bind(i64::from(state.violation_days))
        .bind(state.accumulated_penalty)
        .bind(state.remaining_amount)
        .bind(state.refund_amount)
        .bind(contract_id)
        .bind(expected_revision)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if rows == 0 {
        // Dropping the transaction rolls the outcome row back too.
        return Err(ApiError::Conflict);
    }

    tx.commit().await?;
    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ─────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────
