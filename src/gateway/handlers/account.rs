//! Account handlers

use std::sync::Arc;

use axum::extract::State;

use super::super::state::AppState;
use super::super::types::{
    ApiCreated, ApiResult, CreateAccountRequest, IdPath, ListAccountsQuery, ValidJson, ValidPath,
    ValidQuery, created, ok,
};
use crate::ledger::{Account, NewAccount};

/// Open an account with a zero balance
#[utoipa::path(
    post,
    path = "/api/v1/accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = Account),
        (status = 400, description = "Invalid parameters"),
        (status = 404, description = "Owner does not exist"),
        (status = 409, description = "Owner already has an account in this currency")
    ),
    tag = "Accounts"
)]
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateAccountRequest>,
) -> ApiCreated<Account> {
    let account = state
        .ledger
        .create_account(NewAccount {
            owner: req.owner,
            balance: 0,
            currency: req.currency,
        })
        .await?;
    created(account)
}

#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}",
    params(IdPath),
    responses(
        (status = 200, description = "Account", body = Account),
        (status = 404, description = "No such account")
    ),
    tag = "Accounts"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    ValidPath(path): ValidPath<IdPath>,
) -> ApiResult<Account> {
    ok(state.ledger.get_account(path.id).await?)
}

/// List accounts ordered by id
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    params(ListAccountsQuery),
    responses(
        (status = 200, description = "One page of accounts", body = Vec<Account>),
        (status = 400, description = "Invalid pagination")
    ),
    tag = "Accounts"
)]
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<ListAccountsQuery>,
) -> ApiResult<Vec<Account>> {
    let accounts = state
        .ledger
        .list_accounts(query.owner.as_deref(), query.page()?)
        .await?;
    ok(accounts)
}
