//! Simple Bank - Ledger Banking API
//!
//! Accounts holding a single currency, an append-only trail of balance
//! entries, and atomic transfers between accounts.
//!
//! # Modules
//!
//! - [`ledger`] - Records, the store traits, both stores and the transfer engine
//! - [`db`] - PostgreSQL pool and schema bootstrap
//! - [`gateway`] - HTTP API (axum) and OpenAPI document
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`util`] - Random fixtures for tests and seeding

pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod util;

// Convenient re-exports at crate root
pub use config::{AppConfig, LedgerBackend, LedgerConfig};
pub use gateway::{AppState, build_router, run_server};
pub use ledger::{
    Account, BalancePolicy, Currency, Entry, LedgerError, LedgerStore, MemoryLedger, PgLedger,
    Transfer, TransferEngine, TransferParams, TransferResult, User,
};
