//! Entry handlers (read-only)

use std::sync::Arc;

use axum::extract::State;

use super::super::state::AppState;
use super::super::types::{ApiResult, IdPath, ListEntriesQuery, ValidPath, ValidQuery, ok};
use crate::ledger::Entry;

#[utoipa::path(
    get,
    path = "/api/v1/entries/{id}",
    params(IdPath),
    responses(
        (status = 200, description = "Entry", body = Entry),
        (status = 404, description = "No such entry")
    ),
    tag = "Entries"
)]
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    ValidPath(path): ValidPath<IdPath>,
) -> ApiResult<Entry> {
    ok(state.ledger.get_entry(path.id).await?)
}

/// Entries of one account, ordered by id
#[utoipa::path(
    get,
    path = "/api/v1/entries",
    params(ListEntriesQuery),
    responses(
        (status = 200, description = "One page of entries", body = Vec<Entry>),
        (status = 400, description = "Invalid pagination")
    ),
    tag = "Entries"
)]
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<ListEntriesQuery>,
) -> ApiResult<Vec<Entry>> {
    ok(state
        .ledger
        .list_entries(query.account_id, query.page()?)
        .await?)
}
