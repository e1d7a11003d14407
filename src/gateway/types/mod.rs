//! Gateway types module
//!
//! ## Input Types
//! - [`ValidJson`], [`ValidQuery`], [`ValidPath`]: Axum extractors that run
//!   `validator` checks before the handler sees the value
//! - Request DTOs for users, accounts, entries and transfers
//!
//! ## Output Types
//! - [`ApiResponse<T>`]: Unified API response wrapper
//! - [`ApiError`]: Handler error with HTTP status and error code
//!
//! ## Submodules
//! - [`request`]: Request DTOs and extractors
//! - [`response`]: Response envelope and error codes

pub mod request;
pub mod response;

pub use request::{
    CreateAccountRequest, CreateTransferRequest, CreateUserRequest, IdPath, ListAccountsQuery,
    ListEntriesQuery, ListTransfersQuery, UsernamePath, ValidJson, ValidPath, ValidQuery,
};
pub use response::{ApiCreated, ApiError, ApiResponse, ApiResult, created, error_codes, ok};
