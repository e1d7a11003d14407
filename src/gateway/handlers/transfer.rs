//! Transfer handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};

use super::super::state::AppState;
use super::super::types::{
    ApiError, ApiResult, CreateTransferRequest, IdPath, ListTransfersQuery, ValidJson, ValidPath,
    ValidQuery, error_codes, ok,
};
use crate::ledger::{Account, Currency, Transfer, TransferParams, TransferResult};

/// Load an account and check it holds the requested currency
async fn valid_account(
    state: &AppState,
    account_id: i64,
    currency: Currency,
) -> Result<Account, ApiError> {
    let account = state.ledger.get_account(account_id).await?;
    if account.currency != currency {
        return ApiError::new(
            StatusCode::BAD_REQUEST,
            error_codes::CURRENCY_MISMATCH,
            format!(
                "account [{}] currency mismatch: {} vs {}",
                account_id, account.currency, currency
            ),
        )
        .into_err();
    }
    Ok(account)
}

/// Move funds between two accounts of the same currency
///
/// Returns the transfer record, both entries and both accounts with their
/// updated balances.
#[utoipa::path(
    post,
    path = "/api/v1/transfers",
    request_body = CreateTransferRequest,
    responses(
        (status = 200, description = "Transfer committed", body = TransferResult),
        (status = 400, description = "Invalid parameters, currency mismatch or insufficient funds"),
        (status = 404, description = "Account not found"),
        (status = 500, description = "Storage failure, safe to retry")
    ),
    tag = "Transfers"
)]
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateTransferRequest>,
) -> ApiResult<TransferResult> {
    valid_account(&state, req.from_account_id, req.currency).await?;
    valid_account(&state, req.to_account_id, req.currency).await?;

    let result = state
        .engine
        .transfer(TransferParams {
            from_account_id: req.from_account_id,
            to_account_id: req.to_account_id,
            amount: req.amount,
        })
        .await?;
    ok(result)
}

#[utoipa::path(
    get,
    path = "/api/v1/transfers/{id}",
    params(IdPath),
    responses(
        (status = 200, description = "Transfer", body = Transfer),
        (status = 404, description = "No such transfer")
    ),
    tag = "Transfers"
)]
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    ValidPath(path): ValidPath<IdPath>,
) -> ApiResult<Transfer> {
    ok(state.ledger.get_transfer(path.id).await?)
}

/// Transfers leaving `from_account_id` or arriving at `to_account_id`
#[utoipa::path(
    get,
    path = "/api/v1/transfers",
    params(ListTransfersQuery),
    responses(
        (status = 200, description = "One page of transfers", body = Vec<Transfer>),
        (status = 400, description = "Invalid pagination")
    ),
    tag = "Transfers"
)]
pub async fn list_transfers(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<ListTransfersQuery>,
) -> ApiResult<Vec<Transfer>> {
    ok(state
        .ledger
        .list_transfers(query.filter(), query.page()?)
        .await?)
}
