//! Store traits
//!
//! `LedgerStore` is the read and create surface used by request handlers.
//! Balance mutation and the append-only inserts are reachable only through
//! a `LedgerTx`, the unit of work handed out by `LedgerStore::begin`.
//!
//! A `LedgerTx` that is dropped without `commit` rolls back.

use async_trait::async_trait;

use super::error::LedgerError;
use super::models::{
    Account, Entry, NewAccount, NewUser, Page, Transfer, TransferFilter, TransferParams, User,
};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Backing store for users, accounts, entries and transfers
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Verify the backing store is reachable
    async fn health_check(&self) -> LedgerResult<()>;

    /// Open a unit of work
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>>;

    // === Users ===
    async fn create_user(&self, user: NewUser) -> LedgerResult<User>;
    async fn get_user(&self, username: &str) -> LedgerResult<User>;

    // === Accounts ===
    async fn create_account(&self, account: NewAccount) -> LedgerResult<Account>;
    async fn get_account(&self, id: i64) -> LedgerResult<Account>;
    /// Accounts ordered by id, optionally restricted to one owner
    async fn list_accounts(&self, owner: Option<&str>, page: Page) -> LedgerResult<Vec<Account>>;

    // === Entries (append-only) ===
    async fn get_entry(&self, id: i64) -> LedgerResult<Entry>;
    /// Entries of one account ordered by id
    async fn list_entries(&self, account_id: i64, page: Page) -> LedgerResult<Vec<Entry>>;

    // === Transfers (append-only) ===
    async fn get_transfer(&self, id: i64) -> LedgerResult<Transfer>;
    /// Transfers matching `filter` ordered by id
    async fn list_transfers(
        &self,
        filter: TransferFilter,
        page: Page,
    ) -> LedgerResult<Vec<Transfer>>;
}

/// A single atomic unit of work
///
/// Row locks taken by `lock_account` are held until the unit commits or is
/// dropped. Writes are invisible to other units until `commit`.
#[async_trait]
pub trait LedgerTx: Send {
    /// Lock an account row for update and return its current state.
    ///
    /// Fails with `AccountNotFound` when the row does not exist.
    async fn lock_account(&mut self, id: i64) -> LedgerResult<Account>;

    /// Append a transfer record
    async fn insert_transfer(&mut self, params: TransferParams) -> LedgerResult<Transfer>;

    /// Append a signed entry against one account
    async fn insert_entry(&mut self, account_id: i64, amount: i64) -> LedgerResult<Entry>;

    /// Atomically apply `delta` to an account balance
    async fn add_balance(&mut self, id: i64, delta: i64) -> LedgerResult<Account>;

    /// Make every write of this unit visible and release its locks
    async fn commit(self: Box<Self>) -> LedgerResult<()>;

    /// Discard every write of this unit and release its locks
    async fn rollback(self: Box<Self>) -> LedgerResult<()>;
}
