use std::sync::Arc;

use crate::ledger::{BalancePolicy, LedgerStore, TransferEngine};

/// Gateway application state (shared by all handlers)
#[derive(Clone)]
pub struct AppState {
    /// Reads and single-record creates
    pub ledger: Arc<dyn LedgerStore>,
    /// Transfers, over the same store
    pub engine: TransferEngine,
}

impl AppState {
    pub fn new(ledger: Arc<dyn LedgerStore>, policy: BalancePolicy) -> Self {
        let engine = TransferEngine::new(ledger.clone(), policy);
        Self { ledger, engine }
    }
}
