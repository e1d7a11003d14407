//! Ledger Error Types
//!
//! Every failure the stores and the transfer engine can report. Backing
//! store errors are folded into this taxonomy at the store boundary so that
//! callers never see `sqlx::Error` directly.

use thiserror::Error;

use super::models::Currency;

/// Coarse classification used by the request layer to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    InsufficientFunds,
    Conflict,
    Storage,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    // === Lookup Errors ===
    #[error("{0} not found")]
    NotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    // === Validation Errors ===
    #[error("Source and destination accounts are the same")]
    SelfTransfer,

    #[error("Invalid amount: must be positive")]
    InvalidAmount,

    #[error("Account currency mismatch: {from} vs {to}")]
    CurrencyMismatch { from: Currency, to: Currency },

    #[error("Invalid input: {0}")]
    Validation(String),

    // === Balance Errors ===
    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: i64,
        balance: i64,
        required: i64,
    },

    // === Uniqueness Errors ===
    #[error("Already exists: {0}")]
    Conflict(String),

    // === System Errors ===
    #[error("Timed out waiting for lock on account {0}")]
    LockTimeout(i64),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound(_) | LedgerError::AccountNotFound(_) => ErrorKind::NotFound,
            LedgerError::SelfTransfer
            | LedgerError::InvalidAmount
            | LedgerError::CurrencyMismatch { .. }
            | LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::LockTimeout(_) | LedgerError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether a caller may retry the same request unchanged.
    ///
    /// A retried transfer is a new transfer: there is no deduplication.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}

// PostgreSQL SQLSTATE codes that are not covered by sqlx helpers
const PG_CHECK_VIOLATION: &str = "23514";
const PG_NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";
pub(crate) const PG_LOCK_NOT_AVAILABLE: &str = "55P03";
const PG_DEADLOCK_DETECTED: &str = "40P01";
const PG_SERIALIZATION_FAILURE: &str = "40001";

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => LedgerError::NotFound("Record".to_string()),
            sqlx::Error::PoolTimedOut => {
                LedgerError::Storage("timed out acquiring a database connection".to_string())
            }
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                if db_err.is_unique_violation() {
                    return LedgerError::Conflict(constraint);
                }
                if db_err.is_foreign_key_violation() {
                    return LedgerError::NotFound(format!("Referenced record ({})", constraint));
                }
                match db_err.code().as_deref() {
                    Some(PG_CHECK_VIOLATION) => {
                        LedgerError::Validation(format!("constraint {} violated", constraint))
                    }
                    Some(PG_NUMERIC_VALUE_OUT_OF_RANGE) => {
                        LedgerError::Validation("balance overflow".to_string())
                    }
                    Some(PG_LOCK_NOT_AVAILABLE) => {
                        LedgerError::Storage(format!("lock timeout: {}", db_err.message()))
                    }
                    Some(PG_DEADLOCK_DETECTED) | Some(PG_SERIALIZATION_FAILURE) => {
                        LedgerError::Storage(format!("transaction aborted: {}", db_err.message()))
                    }
                    _ => LedgerError::Storage(db_err.to_string()),
                }
            }
            other => LedgerError::Storage(other.to_string()),
        }
    }
}
