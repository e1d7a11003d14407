//! Simple Bank - HTTP server entry point
//!
//! ```text
//! simple_bank [--env <name>] [--port <port>]
//! ```
//!
//! Loads `config/<env>.yaml` (default `dev`), opens the configured ledger
//! store and serves the API until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;

use simple_bank::config::{AppConfig, LedgerBackend};
use simple_bank::db::{Database, schema};
use simple_bank::gateway::{self, AppState};
use simple_bank::ledger::{BalancePolicy, LedgerStore, MemoryLedger, PgLedger};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> anyhow::Result<Option<u16>> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            let port = args[i + 1]
                .parse()
                .with_context(|| format!("invalid --port value: {}", args[i + 1]))?;
            return Ok(Some(port));
        }
    }
    Ok(None)
}

async fn open_ledger(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let ledger = &config.ledger;
    match ledger.backend {
        LedgerBackend::Postgres => {
            let url = ledger.database_url()?;
            let db = Database::connect(&url, ledger)
                .await
                .context("failed to connect to PostgreSQL")?;
            schema::ensure_schema(db.pool())
                .await
                .context("failed to initialize schema")?;
            Ok(Arc::new(PgLedger::new(db.pool().clone(), ledger.lock_timeout())))
        }
        LedgerBackend::Memory => {
            tracing::warn!("Using in-memory ledger: all data is lost on exit");
            Ok(Arc::new(MemoryLedger::new(ledger.lock_timeout())))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override()? {
        app_config.gateway.port = port;
    }
    let _log_guard = simple_bank::logging::init_logging(&app_config);

    tracing::info!("Starting Simple Bank in {} mode", env);

    let ledger = open_ledger(&app_config).await?;
    let policy = BalancePolicy {
        allow_overdraft: app_config.ledger.allow_overdraft,
    };
    if policy.allow_overdraft {
        tracing::warn!("Overdraft allowed: balances may go negative");
    }

    let state = Arc::new(AppState::new(ledger, policy));
    gateway::run_server(&app_config.gateway, state).await?;

    tracing::info!("Server stopped");
    Ok(())
}
