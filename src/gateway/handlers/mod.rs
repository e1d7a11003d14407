//! HTTP handlers, one submodule per resource

pub mod account;
pub mod entry;
pub mod health;
pub mod transfer;
pub mod user;

pub use account::{create_account, get_account, list_accounts};
pub use entry::{get_entry, list_entries};
pub use health::{HealthResponse, health_check};
pub use transfer::{create_transfer, get_transfer, list_transfers};
pub use user::{create_user, get_user};
