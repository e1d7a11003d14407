//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{CreateAccountRequest, CreateTransferRequest, CreateUserRequest};
use crate::ledger::{Account, Currency, Entry, Transfer, TransferResult, User};

/// Main API Documentation struct
///
/// Every success body is wrapped in `{code: 0, msg: "ok", data}`; errors
/// carry a non-zero `code` and no `data`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Simple Bank API",
        version = "1.0.0",
        description = "Accounts, balance entries and atomic money transfers.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::gateway::handlers::user::create_user,
        crate::gateway::handlers::user::get_user,
        crate::gateway::handlers::account::create_account,
        crate::gateway::handlers::account::get_account,
        crate::gateway::handlers::account::list_accounts,
        crate::gateway::handlers::entry::get_entry,
        crate::gateway::handlers::entry::list_entries,
        crate::gateway::handlers::transfer::create_transfer,
        crate::gateway::handlers::transfer::get_transfer,
        crate::gateway::handlers::transfer::list_transfers,
    ),
    components(
        schemas(
            HealthResponse,
            Currency,
            User,
            Account,
            Entry,
            Transfer,
            TransferResult,
            CreateUserRequest,
            CreateAccountRequest,
            CreateTransferRequest,
        )
    ),
    tags(
        (name = "Users", description = "Account owners"),
        (name = "Accounts", description = "Open and query accounts"),
        (name = "Entries", description = "Per-account balance changes (read-only)"),
        (name = "Transfers", description = "Atomic transfers between accounts"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
