use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use libookin_core::{
    PayeeAccount, PayeeId, PayoutBatch, PayoutCommand, PayoutError, PayoutRecord, TriggerSource,
};
use libookin_payouts::{
    PayeeBalance, PayoutPreview, PayoutWorkflow, TriggerOutcome, link_account,
    mark_entries_failed, payee_balance, payout_history, requeue_failed_entries, royalty_entries,
};
use libookin_platform::{
    BatchActionResponse, CancelBatchRequest, CurrentBatchResponse, EntryCorrectionResponse,
    LinkAccountRequest, ListQuery, MarkEntriesFailedRequest, PayeeRoyaltiesResponse,
    RequeueEntriesRequest,
};
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    workflow: PayoutWorkflow,
}

impl AppState {
    pub fn new(workflow: PayoutWorkflow) -> Self {
        Self { workflow }
    }
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/payouts/actions", post(payout_action))
        .route("/payouts/trigger", post(trigger_payout))
        .route("/payouts/cancel", post(cancel_batch))
        .route("/payouts/preview", get(preview_payout))
        .route("/payouts/batches", get(list_batches))
        .route("/payouts/batches/current", get(current_batch))
        .route("/payouts/batches/{batch_id}", get(get_batch))
        .route("/payees/{payee_id}/balance", get(get_payee_balance))
        .route("/payees/{payee_id}/payouts", get(list_payee_payouts))
        .route("/payees/{payee_id}/royalties", get(list_payee_royalties))
        .route("/payees/{payee_id}/account", put(set_payee_account))
        .route("/royalties/mark-failed", post(mark_royalties_failed))
        .route("/royalties/requeue", post(requeue_royalties))
        .with_state(state)
}

fn payout_error(err: PayoutError) -> (StatusCode, String) {
    let status = match &err {
        PayoutError::Validation(_) => StatusCode::BAD_REQUEST,
        PayoutError::NotFound(_) => StatusCode::NOT_FOUND,
        PayoutError::Conflict(_) => StatusCode::CONFLICT,
        PayoutError::NoEligiblePayees => StatusCode::UNPROCESSABLE_ENTITY,
        PayoutError::Remote(_) => StatusCode::BAD_GATEWAY,
        PayoutError::DataIntegrity(_) | PayoutError::Storage(_) => {
            error!("admin request failed: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn list_limit(query: &ListQuery) -> usize {
    query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn payout_action(
    State(state): State<AppState>,
    Json(command): Json<PayoutCommand>,
) -> ApiResult<(StatusCode, Json<BatchActionResponse>)> {
    match command {
        PayoutCommand::TriggerPayout => trigger(&state).await,
        PayoutCommand::CancelBatch { batch_id } => cancel(&state, batch_id).await,
    }
}

async fn trigger_payout(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<BatchActionResponse>)> {
    trigger(&state).await
}

async fn cancel_batch(
    State(state): State<AppState>,
    Query(request): Query<CancelBatchRequest>,
) -> ApiResult<(StatusCode, Json<BatchActionResponse>)> {
    cancel(&state, request.batch_id).await
}

async fn trigger(state: &AppState) -> ApiResult<(StatusCode, Json<BatchActionResponse>)> {
    let outcome = state
        .workflow
        .trigger(TriggerSource::Manual)
        .await
        .map_err(payout_error)?;

    let (status, label, batch) = match outcome {
        TriggerOutcome::Scheduled(batch) => (StatusCode::CREATED, "scheduled", batch),
        TriggerOutcome::AlreadyInFlight(batch) => {
            (StatusCode::CONFLICT, "already_in_flight", batch)
        }
    };
    info!(batch_id = %batch.id, status = label, "manual payout trigger");

    Ok((
        status,
        Json(BatchActionResponse {
            status: label.to_string(),
            batch,
        }),
    ))
}

async fn cancel(
    state: &AppState,
    batch_id: Option<Uuid>,
) -> ApiResult<(StatusCode, Json<BatchActionResponse>)> {
    let batch = state
        .workflow
        .cancel(batch_id)
        .await
        .map_err(payout_error)?;

    Ok((
        StatusCode::OK,
        Json(BatchActionResponse {
            status: "cancelled".to_string(),
            batch,
        }),
    ))
}

async fn preview_payout(State(state): State<AppState>) -> ApiResult<Json<PayoutPreview>> {
    let preview = state.workflow.preview().await.map_err(payout_error)?;
    Ok(Json(preview))
}

async fn current_batch(State(state): State<AppState>) -> ApiResult<Json<CurrentBatchResponse>> {
    let batch = state.workflow.current().await.map_err(payout_error)?;
    Ok(Json(CurrentBatchResponse { batch }))
}

async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<PayoutBatch>>> {
    let batches = state
        .workflow
        .history(list_limit(&query))
        .await
        .map_err(payout_error)?;
    Ok(Json(batches))
}

async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<PayoutBatch>> {
    let batch = state.workflow.batch(batch_id).await.map_err(payout_error)?;
    Ok(Json(batch))
}

async fn get_payee_balance(
    State(state): State<AppState>,
    Path(payee_id): Path<PayeeId>,
) -> ApiResult<Json<PayeeBalance>> {
    let balance = payee_balance(state.workflow.context(), payee_id)
        .await
        .map_err(payout_error)?;
    Ok(Json(balance))
}

async fn list_payee_payouts(
    State(state): State<AppState>,
    Path(payee_id): Path<PayeeId>,
) -> ApiResult<Json<Vec<PayoutRecord>>> {
    let records = payout_history(state.workflow.context(), payee_id)
        .await
        .map_err(payout_error)?;
    Ok(Json(records))
}

async fn list_payee_royalties(
    State(state): State<AppState>,
    Path(payee_id): Path<PayeeId>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<PayeeRoyaltiesResponse>> {
    let entries = royalty_entries(state.workflow.context(), payee_id, list_limit(&query))
        .await
        .map_err(payout_error)?;
    Ok(Json(PayeeRoyaltiesResponse { payee_id, entries }))
}

async fn set_payee_account(
    State(state): State<AppState>,
    Path(payee_id): Path<PayeeId>,
    Json(payload): Json<LinkAccountRequest>,
) -> ApiResult<Json<PayeeAccount>> {
    let account = link_account(state.workflow.context(), payee_id, payload.remote_account_id)
        .await
        .map_err(payout_error)?;
    Ok(Json(account))
}

async fn mark_royalties_failed(
    State(state): State<AppState>,
    Json(payload): Json<MarkEntriesFailedRequest>,
) -> ApiResult<Json<EntryCorrectionResponse>> {
    let updated = mark_entries_failed(state.workflow.context(), &payload.entry_ids, &payload.reason)
        .await
        .map_err(payout_error)?;
    Ok(Json(EntryCorrectionResponse {
        requested: payload.entry_ids.len(),
        updated,
    }))
}

async fn requeue_royalties(
    State(state): State<AppState>,
    Json(payload): Json<RequeueEntriesRequest>,
) -> ApiResult<Json<EntryCorrectionResponse>> {
    let updated = requeue_failed_entries(state.workflow.context(), &payload.entry_ids)
        .await
        .map_err(payout_error)?;
    Ok(Json(EntryCorrectionResponse {
        requested: payload.entry_ids.len(),
        updated,
    }))
}
