//! PostgreSQL ledger store
//!
//! One database transaction per unit of work. Row locks are
//! `SELECT ... FOR NO KEY UPDATE`, which does not conflict with the
//! `KEY SHARE` locks that foreign-key checks take on `accounts` when
//! entries and transfers are inserted. Balances change only through
//! `UPDATE accounts SET balance = balance + $1`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

use super::error::{LedgerError, PG_LOCK_NOT_AVAILABLE};
use super::models::{
    Account, Entry, NewAccount, NewUser, Page, Transfer, TransferFilter, TransferParams, User,
};
use super::store::{LedgerResult, LedgerStore, LedgerTx};

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";

/// Ledger backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedger {
    /// `lock_timeout` bounds how long a unit of work waits for a row lock
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let mut tx = self.pool.begin().await?;
        // Scoped to this transaction only
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn create_user(&self, user: NewUser) -> LedgerResult<User> {
        let created: User = sqlx::query_as(
            r#"INSERT INTO users (username, full_name, email)
               VALUES ($1, $2, $3)
               RETURNING username, full_name, email, created_at"#,
        )
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(&user.email)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(username = %created.username, "User created");
        Ok(created)
    }

    async fn get_user(&self, username: &str) -> LedgerResult<User> {
        sqlx::query_as(
            r#"SELECT username, full_name, email, created_at
               FROM users WHERE username = $1"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("User {}", username)))
    }

    async fn create_account(&self, account: NewAccount) -> LedgerResult<Account> {
        account.validate()?;

        let created: Account = sqlx::query_as(&format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, $2, $3) RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(&account.owner)
        .bind(account.balance)
        .bind(account.currency.code())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            account_id = created.id,
            owner = %created.owner,
            currency = %created.currency,
            "Account created"
        );
        Ok(created)
    }

    async fn get_account(&self, id: i64) -> LedgerResult<Account> {
        sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::AccountNotFound(id))
    }

    async fn list_accounts(&self, owner: Option<&str>, page: Page) -> LedgerResult<Vec<Account>> {
        let accounts = sqlx::query_as(&format!(
            r#"SELECT {} FROM accounts
               WHERE ($1::text IS NULL OR owner = $1)
               ORDER BY id
               LIMIT $2 OFFSET $3"#,
            ACCOUNT_COLUMNS
        ))
        .bind(owner)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn get_entry(&self, id: i64) -> LedgerResult<Entry> {
        sqlx::query_as("SELECT id, account_id, amount, created_at FROM entries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Entry {}", id)))
    }

    async fn list_entries(&self, account_id: i64, page: Page) -> LedgerResult<Vec<Entry>> {
        let entries = sqlx::query_as(
            r#"SELECT id, account_id, amount, created_at FROM entries
               WHERE account_id = $1
               ORDER BY id
               LIMIT $2 OFFSET $3"#,
        )
        .bind(account_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn get_transfer(&self, id: i64) -> LedgerResult<Transfer> {
        sqlx::query_as(
            r#"SELECT id, from_account_id, to_account_id, amount, created_at
               FROM transfers WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Transfer {}", id)))
    }

    async fn list_transfers(
        &self,
        filter: TransferFilter,
        page: Page,
    ) -> LedgerResult<Vec<Transfer>> {
        let transfers = sqlx::query_as(
            r#"SELECT id, from_account_id, to_account_id, amount, created_at
               FROM transfers
               WHERE from_account_id = $1 OR to_account_id = $2
               ORDER BY id
               LIMIT $3 OFFSET $4"#,
        )
        .bind(filter.from_account_id)
        .bind(filter.to_account_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(transfers)
    }
}

/// Unit of work over one PostgreSQL transaction.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

/// A lock-wait timeout on `id` is reported as `LockTimeout(id)`
fn lock_error(id: i64, err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(PG_LOCK_NOT_AVAILABLE) {
            return LedgerError::LockTimeout(id);
        }
    }
    err.into()
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn lock_account(&mut self, id: i64) -> LedgerResult<Account> {
        sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR NO KEY UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| lock_error(id, e))?
        .ok_or(LedgerError::AccountNotFound(id))
    }

    async fn insert_transfer(&mut self, params: TransferParams) -> LedgerResult<Transfer> {
        let transfer = sqlx::query_as(
            r#"INSERT INTO transfers (from_account_id, to_account_id, amount)
               VALUES ($1, $2, $3)
               RETURNING id, from_account_id, to_account_id, amount, created_at"#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.amount)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(transfer)
    }

    async fn insert_entry(&mut self, account_id: i64, amount: i64) -> LedgerResult<Entry> {
        let entry = sqlx::query_as(
            r#"INSERT INTO entries (account_id, amount)
               VALUES ($1, $2)
               RETURNING id, account_id, amount, created_at"#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(entry)
    }

    async fn add_balance(&mut self, id: i64, delta: i64) -> LedgerResult<Account> {
        sqlx::query_as(&format!(
            "UPDATE accounts SET balance = balance + $1 WHERE id = $2 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(delta)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| lock_error(id, e))?
        .ok_or(LedgerError::AccountNotFound(id))
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
