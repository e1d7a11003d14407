//! Ledger data model: users, accounts, entries and transfers.
//!
//! Entries and transfers are write-once. There is no type in this module
//! that can express an update to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::error::LedgerError;

// ============================================================================
// Currency
// ============================================================================

/// Supported account currencies (ISO 4217 code)
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Currency {
    USD,
    EUR,
    CAD,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::USD, Currency::EUR, Currency::CAD];

    pub fn code(self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::CAD => "CAD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "CAD" => Ok(Currency::CAD),
            _ => Err(format!("Unsupported currency: {}", s)),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Records
// ============================================================================

/// Bank customer. Accounts reference their owner by `username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "Alice Liddell")]
    pub full_name: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Account holding a single-currency balance in minor units (cents)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    /// Balance in minor units
    #[schema(example = 10000)]
    pub balance: i64,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

/// Signed balance change of one account (+ credit, - debit)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Entry {
    pub id: i64,
    pub account_id: i64,
    #[schema(example = -3000)]
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Movement of funds between two distinct accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    /// Always positive
    #[schema(example = 3000)]
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Everything a committed transfer wrote, with both accounts as they stand
/// after the balance update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    pub from_account: Account,
    pub to_account: Account,
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub owner: String,
    pub balance: i64,
    pub currency: Currency,
}

impl NewAccount {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.owner.is_empty() {
            return Err(LedgerError::Validation("owner must not be empty".to_string()));
        }
        if self.balance < 0 {
            return Err(LedgerError::Validation(
                "initial balance must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Arguments of a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

/// Filter for transfer listing: a transfer matches when it leaves
/// `from_account_id` or arrives at `to_account_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFilter {
    pub from_account_id: i64,
    pub to_account_id: i64,
}

impl TransferFilter {
    pub fn matches(&self, transfer: &Transfer) -> bool {
        transfer.from_account_id == self.from_account_id
            || transfer.to_account_id == self.to_account_id
    }
}

/// Offset/limit window over an ordered listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    /// Translate a 1-based page number into an offset/limit window.
    ///
    /// A page number whose offset does not fit in `i64` is a validation error.
    pub fn from_page_id(page_id: i64, page_size: i64) -> Result<Self, LedgerError> {
        let offset = page_id
            .checked_sub(1)
            .and_then(|p| p.checked_mul(page_size))
            .filter(|offset| *offset >= 0)
            .ok_or_else(|| {
                LedgerError::Validation(format!(
                    "page_id {} out of range for page_size {}",
                    page_id, page_size
                ))
            })?;
        Ok(Self {
            offset,
            limit: page_size,
        })
    }
}
