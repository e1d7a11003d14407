//! Ledger Core
//!
//! Accounts, the append-only entry and transfer logs, and the transfer
//! engine that moves funds between accounts.
//!
//! # Invariants
//!
//! 1. **Atomicity**: a transfer writes one transfer record, two entries and
//!    two balance updates in one unit of work, or nothing at all
//! 2. **Zero-sum entries**: the two entries of a transfer are `-amount` on
//!    the source and `+amount` on the destination
//! 3. **Lock ordering**: account rows are locked and updated in ascending id
//!    order, whichever side is debited
//! 4. **Append-only audit trail**: entries and transfers have no update or
//!    delete operation anywhere in the API
//!
//! # Stores
//!
//! - [`PgLedger`]: PostgreSQL, row locks via `FOR NO KEY UPDATE`
//! - [`MemoryLedger`]: in-process, one async mutex per account row

pub mod engine;
pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use engine::{BalancePolicy, TransferEngine, lock_order};
pub use error::{ErrorKind, LedgerError};
pub use memory::MemoryLedger;
pub use models::{
    Account, Currency, Entry, NewAccount, NewUser, Page, Transfer, TransferFilter,
    TransferParams, TransferResult, User,
};
pub use postgres::PgLedger;
pub use store::{LedgerResult, LedgerStore, LedgerTx};
