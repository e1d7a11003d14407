//! User handlers

use std::sync::Arc;

use axum::extract::State;

use super::super::state::AppState;
use super::super::types::{
    ApiCreated, ApiResult, CreateUserRequest, UsernamePath, ValidJson, ValidPath, created, ok,
};
use crate::ledger::{NewUser, User};

/// Register a user
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid parameters"),
        (status = 409, description = "Username or email already taken")
    ),
    tag = "Users"
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateUserRequest>,
) -> ApiCreated<User> {
    let user = state
        .ledger
        .create_user(NewUser {
            username: req.username,
            full_name: req.full_name,
            email: req.email,
        })
        .await?;
    created(user)
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    params(UsernamePath),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "No such user")
    ),
    tag = "Users"
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ValidPath(path): ValidPath<UsernamePath>,
) -> ApiResult<User> {
    ok(state.ledger.get_user(&path.username).await?)
}
