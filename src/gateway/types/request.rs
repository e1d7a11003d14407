//! Request DTOs and validating extractors
//!
//! Bodies, query strings and path parameters are deserialized by axum and
//! then checked with `validator`. Every rejection, whether malformed or
//! out of range, is answered with the unified error envelope and
//! `INVALID_PARAMETER`.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
};
use serde::{Deserialize, de::DeserializeOwned};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use super::response::ApiError;
use crate::ledger::{Currency, LedgerError, Page, TransferFilter};

// ============================================================================
// Extractors
// ============================================================================

/// JSON body that passed `Validate`
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(Self(value))
    }
}

/// Query string that passed `Validate`
#[derive(Debug)]
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(Self(value))
    }
}

/// Path parameters that passed `Validate`
#[derive(Debug)]
pub struct ValidPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(Self(value))
    }
}

// ============================================================================
// Path Parameters
// ============================================================================

/// Numeric record id in the path
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Path)]
pub struct IdPath {
    /// Record id
    #[validate(range(min = 1))]
    pub id: i64,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Path)]
pub struct UsernamePath {
    #[validate(length(min = 1, max = 32))]
    pub username: String,
}

// ============================================================================
// Bodies
// ============================================================================

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(ValidationError::new("alphanum"))
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    /// Letters, digits and underscores
    #[schema(example = "alice")]
    #[validate(length(min = 3, max = 32), custom(function = "validate_username"))]
    pub username: String,
    #[schema(example = "Alice Liddell")]
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[schema(example = "alice@example.com")]
    #[validate(email)]
    pub email: String,
}

/// New accounts always start with a zero balance
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAccountRequest {
    #[schema(example = "alice")]
    #[validate(length(min = 1, max = 32))]
    pub owner: String,
    pub currency: Currency,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTransferRequest {
    #[schema(example = 1)]
    #[validate(range(min = 1))]
    pub from_account_id: i64,
    #[schema(example = 2)]
    #[validate(range(min = 1))]
    pub to_account_id: i64,
    /// Minor units, strictly positive
    #[schema(example = 10)]
    #[validate(range(min = 1))]
    pub amount: i64,
    /// Must match the currency of both accounts
    pub currency: Currency,
}

// ============================================================================
// Query Strings
// ============================================================================

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListAccountsQuery {
    /// Only accounts of this owner
    pub owner: Option<String>,
    /// 1-based page number
    #[validate(range(min = 1))]
    pub page_id: i64,
    #[validate(range(min = 5, max = 10))]
    pub page_size: i64,
}

impl ListAccountsQuery {
    pub fn page(&self) -> Result<Page, LedgerError> {
        Page::from_page_id(self.page_id, self.page_size)
    }
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListEntriesQuery {
    #[validate(range(min = 1))]
    pub account_id: i64,
    #[validate(range(min = 1))]
    pub page_id: i64,
    #[validate(range(min = 5, max = 10))]
    pub page_size: i64,
}

impl ListEntriesQuery {
    pub fn page(&self) -> Result<Page, LedgerError> {
        Page::from_page_id(self.page_id, self.page_size)
    }
}

/// Transfers leaving `from_account_id` or arriving at `to_account_id`
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTransfersQuery {
    #[validate(range(min = 1))]
    pub from_account_id: i64,
    #[validate(range(min = 1))]
    pub to_account_id: i64,
    #[validate(range(min = 1))]
    pub page_id: i64,
    #[validate(range(min = 5, max = 10))]
    pub page_size: i64,
}

impl ListTransfersQuery {
    pub fn page(&self) -> Result<Page, LedgerError> {
        Page::from_page_id(self.page_id, self.page_size)
    }

    pub fn filter(&self) -> TransferFilter {
        TransferFilter {
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
        }
    }
}
