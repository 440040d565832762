//! Axum REST API handlers.
//!
//! Request bodies are explicit schemas validated field by field before
//! any contract is touched; enum-ish fields arrive as strings and are
//! parsed through the ledger's codecs so an unknown value is a clean
//! 400, not a silently-ignored field.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use contract_ledger::{
    ledger, Contract, ContractStatus, NewContract, OutcomeSummary, PaymentStatus, PaymentUpdate,
    PlanType, Settlement, SettlementKind, TaskKind,
};

use crate::auth::AuthUser;
use crate::db::{self, StoredContract};
use crate::errors::{ApiError, Result};
use crate::gateway::GatewayClient;

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub gateway: GatewayClient,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn new_transaction_ref() -> String {
    format!("txn-{}", Uuid::new_v4())
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateContractRequest {
    pub plan: String,
    pub amount: Option<i64>,
    pub duration_days: u16,
    pub daily_tasks: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct PaymentCallbackRequest {
    pub transaction_id: String,
    pub status: String,
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct CheckinRequest {
    pub date: NaiveDate,
    pub task: String,
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct SettleRequest {
    #[serde(default)]
    pub early: bool,
}

#[derive(Deserialize)]
pub struct SnapshotQuery {
    pub revision: Option<i64>,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ContractResponse {
    pub revision: i64,
    pub contract: Contract,
}

impl From<StoredContract> for ContractResponse {
    fn from(stored: StoredContract) -> Self {
        Self {
            revision: stored.revision,
            contract: stored.contract,
        }
    }
}

/// Client-cache revalidation verdict. When `stale` is false the cached
/// copy may be kept; otherwise it must be discarded and replaced with
/// the attached authoritative record.
#[derive(Serialize)]
pub struct SnapshotResponse {
    pub stale: bool,
    pub revision: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<Contract>,
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub update: PaymentUpdate,
    pub contract: Contract,
}

#[derive(Serialize, Debug)]
pub struct CheckinResponse {
    pub date: NaiveDate,
    pub task: TaskKind,
    pub completed: bool,
}

#[derive(Serialize)]
pub struct SettleResponse {
    pub settlement: Settlement,
    /// False when the gateway payout call failed; the settlement itself
    /// stands and the payout is re-driven operationally.
    pub refund_issued: bool,
    pub contract: Contract,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /contracts`
///
/// Creates a `pending` contract for the authenticated user and asks the
/// gateway to charge the deposit. Activation happens later through the
/// payment callback. The created record is returned even when the
/// charge call fails — the caller needs its id to retry the payment or
/// delete the contract, and `payment_status` carries the verdict.
pub async fn create_contract(
    State(state): State<Arc<ApiState>>,
    user: AuthUser,
    Json(req): Json<CreateContractRequest>,
) -> Result<(StatusCode, Json<ContractResponse>)> {
    let plan = PlanType::parse(&req.plan).ok_or_else(|| {
        contract_ledger::Error::Validation(format!("unknown plan {:?}", req.plan))
    })?;
    let daily_tasks = parse_tasks(req.daily_tasks.unwrap_or_default())?;

    let transaction_ref = new_transaction_ref();
    let mut contract = ledger::create(
        NewContract {
            user_id: user.id,
            plan,
            amount: req.amount,
            duration_days: req.duration_days,
            daily_tasks,
        },
        today(),
        transaction_ref.clone(),
    )?;

    let id = db::insert_contract(&state.pool, &contract).await?;
    contract.terms.id = id;
    db::insert_payment_transaction(&state.pool, &transaction_ref, id, contract.terms.amount)
        .await?;

    let mut revision = 0;
    if let Err(e) = state
        .gateway
        .initiate_charge(&transaction_ref, id, user.id, contract.terms.amount)
        .await
    {
        // Leave the row behind in a retryable failed state.
        warn!("deposit charge for contract {id} failed: {e}");
        contract.state.payment_status = PaymentStatus::Failed;
        db::update_state(&state.pool, id, revision, &contract.state).await?;
        db::mark_payment_processed(&state.pool, &transaction_ref, "failed").await?;
        revision += 1;
    }

    Ok((
        StatusCode::CREATED,
        Json(ContractResponse { revision, contract }),
    ))
}

/// `GET /contracts/:id`
///
/// Expiry is evaluated lazily here: an `active` contract whose window
/// has closed is settled before the response is built.
pub async fn get_contract(
    State(state): State<Arc<ApiState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ContractResponse>> {
    let stored = db::get_contract_owned(&state.pool, id, user.id).await?;
    let stored = settle_if_expired(&state, stored).await?;
    Ok(Json(stored.into()))
}

/// `GET /contracts/:id/snapshot?revision=N`
///
/// Revalidates a client-side cached copy against the server record.
pub async fn snapshot(
    State(state): State<Arc<ApiState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<SnapshotResponse>> {
    let stored = db::get_contract_owned(&state.pool, id, user.id).await?;
    let stored = settle_if_expired(&state, stored).await?;

    if query.revision == Some(stored.revision) {
        return Ok(Json(SnapshotResponse {
            stale: false,
            revision: stored.revision,
            contract: None,
        }));
    }

    Ok(Json(SnapshotResponse {
        stale: true,
        revision: stored.revision,
        contract: Some(stored.contract),
    }))
}

/// `DELETE /contracts/:id`
///
/// Only a never-activated contract whose charge failed may be deleted.
pub async fn delete_contract(
    State(state): State<Arc<ApiState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let stored = db::get_contract_owned(&state.pool, id, user.id).await?;
    let s = &stored.contract.state;
    if s.status != ContractStatus::Pending || s.payment_status != PaymentStatus::Failed {
        return Err(contract_ledger::Error::InvalidState(
            "only pending contracts with a failed payment can be deleted".into(),
        )
        .into());
    }

    db::delete_contract(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /contracts/:id/payment/retry`
///
/// Issues a fresh transaction reference and resubmits the charge after
/// a gateway failure.
pub async fn retry_payment(
    State(state): State<Arc<ApiState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ContractResponse>> {
    let stored = db::get_contract_owned(&state.pool, id, user.id).await?;
    let s = &stored.contract.state;
    if s.status != ContractStatus::Pending || s.payment_status != PaymentStatus::Failed {
        return Err(contract_ledger::Error::InvalidState(
            "payment retry requires a pending contract with a failed payment".into(),
        )
        .into());
    }

    let transaction_ref = new_transaction_ref();
    db::reset_payment(&state.pool, id, stored.revision, &transaction_ref).await?;
    db::insert_payment_transaction(
        &state.pool,
        &transaction_ref,
        id,
        stored.contract.terms.amount,
    )
    .await?;

    if let Err(e) = state
        .gateway
        .initiate_charge(&transaction_ref, id, user.id, stored.contract.terms.amount)
        .await
    {
        let fresh = db::get_contract_owned(&state.pool, id, user.id).await?;
        let mut failed = fresh.contract.state.clone();
        failed.payment_status = PaymentStatus::Failed;
        db::update_state(&state.pool, id, fresh.revision, &failed).await?;
        db::mark_payment_processed(&state.pool, &transaction_ref, "failed").await?;
        return Err(e);
    }

    let fresh = db::get_contract_owned(&state.pool, id, user.id).await?;
    Ok(Json(fresh.into()))
}

/// `POST /payments/callback`
///
/// Gateway webhook. Safe to call any number of times with the same
/// transaction reference: replays after activation are no-ops.
pub async fn payment_callback(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<PaymentCallbackRequest>,
) -> Result<Json<CallbackResponse>> {
    let success = match req.status.as_str() {
        "success" => true,
        "failure" => false,
        other => {
            return Err(contract_ledger::Error::Validation(format!(
                "unknown callback status {other:?}"
            ))
            .into())
        }
    };

    let stored = db::get_contract_by_transaction_ref(&state.pool, &req.transaction_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let (terms, mut contract_state) = stored.contract.into_parts();

    if req.amount != terms.amount {
        return Err(contract_ledger::Error::Validation(format!(
            "callback amount {} does not match the contracted deposit {}",
            req.amount, terms.amount
        ))
        .into());
    }

    let before = contract_state.clone();
    let update = ledger::confirm_payment(&terms, &mut contract_state, &req.transaction_id, success)?;

    // A replayed failure verdict leaves the state bit-identical; writing
    // it back would only bump the revision and invalidate client caches.
    if update != PaymentUpdate::AlreadyProcessed && contract_state != before {
        db::update_state(&state.pool, terms.id, stored.revision, &contract_state).await?;
        db::mark_payment_processed(&state.pool, &req.transaction_id, &req.status).await?;
    }

    Ok(Json(CallbackResponse {
        update,
        contract: Contract::from_parts(terms, contract_state),
    }))
}

/// `POST /contracts/:id/checkins`
///
/// Records one task-slot check-in for a calendar day. At most one
/// record per (contract, day, task), and none once the day has been
/// closed — a check-in arriving after the outcome is on the books can
/// no longer influence it.
pub async fn record_checkin(
    State(state): State<Arc<ApiState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<CheckinRequest>,
) -> Result<(StatusCode, Json<CheckinResponse>)> {
    let task = TaskKind::parse(&req.task).ok_or_else(|| {
        contract_ledger::Error::Validation(format!("unknown task {:?}", req.task))
    })?;

    let stored = db::get_contract_owned(&state.pool, id, user.id).await?;
    let terms = &stored.contract.terms;

    if stored.contract.state.status != ContractStatus::Active {
        return Err(contract_ledger::Error::InvalidState(format!(
            "contract is {}",
            stored.contract.state.status.as_str()
        ))
        .into());
    }
    if req.date < terms.start_date || req.date >= terms.end_date {
        return Err(contract_ledger::Error::Validation(format!(
            "date {} outside contract window {}..{}",
            req.date, terms.start_date, terms.end_date
        ))
        .into());
    }
    if !terms.daily_tasks.contains(&task) {
        return Err(contract_ledger::Error::Validation(format!(
            "task {} is not required by this contract",
            task.as_str()
        ))
        .into());
    }
    if db::outcome_exists(&state.pool, id, req.date).await? {
        return Err(contract_ledger::Error::InvalidState(format!(
            "day {} is already closed",
            req.date
        ))
        .into());
    }

    db::insert_checkin(&state.pool, id, req.date, task, req.completed).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckinResponse {
            date: req.date,
            task,
            completed: req.completed,
        }),
    ))
}

/// `POST /contracts/:id/days/:date/close`
///
/// Derives the day's boolean outcome from its check-ins and applies it
/// to the ledger. The unique outcome index makes concurrent closes for
/// the same day safe.
pub async fn close_day(
    State(state): State<Arc<ApiState>>,
    user: AuthUser,
    Path((id, date)): Path<(i64, NaiveDate)>,
) -> Result<Json<OutcomeSummary>> {
    let stored = db::get_contract_owned(&state.pool, id, user.id).await?;
    let (terms, mut contract_state) = stored.contract.into_parts();

    let completed = db::completed_tasks_for_day(&state.pool, id, date).await?;
    let all_completed = ledger::day_outcome(&terms.daily_tasks, &completed);

    let summary = ledger::record_daily_outcome(&terms, &mut contract_state, date, all_completed)?;
    db::record_outcome(
        &state.pool,
        id,
        stored.revision,
        date,
        all_completed,
        &contract_state,
    )
    .await?;

    if let Some(refund) = summary.refund_due {
        // Forced termination: pay the reserved remainder back out. A
        // payout failure is logged, not retried; the recorded outcome
        // stands either way.
        if let Err(e) = state.gateway.issue_refund(id, user.id, refund).await {
            warn!("remainder payout for contract {id} failed: {e}");
        }
    }

    Ok(Json(summary))
}

/// `POST /contracts/:id/settle`
///
/// Explicit settlement: expiry once the window has closed, or early
/// termination with `{"early": true}`.
pub async fn settle_contract(
    State(state): State<Arc<ApiState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<SettleRequest>,
) -> Result<Json<SettleResponse>> {
    let stored = db::get_contract_owned(&state.pool, id, user.id).await?;
    let (terms, mut contract_state) = stored.contract.into_parts();

    let kind = if req.early {
        SettlementKind::UserTermination
    } else {
        SettlementKind::Expiry
    };

    let settlement = ledger::settle(&terms, &mut contract_state, today(), kind)?;
    db::update_state(&state.pool, id, stored.revision, &contract_state).await?;

    let refund_issued = match state
        .gateway
        .issue_refund(id, user.id, settlement.refund_amount)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!("refund payout for contract {id} failed: {e}");
            false
        }
    };

    Ok(Json(SettleResponse {
        settlement,
        refund_issued,
        contract: Contract::from_parts(terms, contract_state),
    }))
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

fn parse_tasks(raw: Vec<String>) -> Result<Vec<TaskKind>> {
    raw.into_iter()
        .map(|t| {
            TaskKind::parse(&t).ok_or_else(|| {
                contract_ledger::Error::Validation(format!("unknown task {t:?}")).into()
            })
        })
        .collect()
}

/// Lazily settle an `active` contract whose window has closed. No
/// background job exists; the next read is the expiry trigger.
async fn settle_if_expired(state: &Arc<ApiState>, stored: StoredContract) -> Result<StoredContract> {
    let now = today();
    if stored.contract.state.status != ContractStatus::Active
        || now < stored.contract.terms.end_date
    {
        return Ok(stored);
    }

    let id = stored.contract.terms.id;
    let user_id = stored.contract.terms.user_id;
    let (terms, mut contract_state) = stored.contract.into_parts();
    let settlement = ledger::settle(&terms, &mut contract_state, now, SettlementKind::Expiry)?;

    match db::update_state(&state.pool, id, stored.revision, &contract_state).await {
        Ok(()) => {
            if let Err(e) = state
                .gateway
                .issue_refund(id, user_id, settlement.refund_amount)
                .await
            {
                warn!("expiry refund payout for contract {id} failed: {e}");
            }
        }
        // Someone else settled concurrently; fall through to the fresh row.
        Err(ApiError::Conflict) => {}
        Err(e) => return Err(e),
    }

    db::get_contract(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound)
}

// ─────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────
