//! In-process ledger store
//!
//! Mirrors the PostgreSQL store's transactional behaviour without a
//! database:
//! - every account row carries its own async mutex, the row lock
//! - a unit of work edits private copies of the rows it locked and stages
//!   its inserts; `commit` publishes them, drop discards them
//! - readers see committed state only and never wait on a row lock
//! - a commit publishes its rows and log records under the write side of
//!   one gate; readers hold the read side, so they see a unit either
//!   entirely or not at all
//!
//! Ids are drawn from counters at insert time, so a rolled-back unit leaves
//! gaps in the sequence just like a database sequence would.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::error::LedgerError;
use super::models::{
    Account, Entry, NewAccount, NewUser, Page, Transfer, TransferFilter, TransferParams, User,
};
use super::store::{LedgerResult, LedgerStore, LedgerTx};

struct AccountRow {
    lock: Arc<Mutex<()>>,
    committed: RwLock<Account>,
}

struct Inner {
    lock_timeout: Duration,
    /// Write side held by `commit` while it publishes
    commit_gate: RwLock<()>,
    users: RwLock<BTreeMap<String, User>>,
    accounts: RwLock<BTreeMap<i64, Arc<AccountRow>>>,
    transfers: RwLock<Vec<Transfer>>,
    entries: RwLock<Vec<Entry>>,
    next_account_id: AtomicI64,
    next_transfer_id: AtomicI64,
    next_entry_id: AtomicI64,
}

impl Inner {
    async fn row(&self, id: i64) -> Option<Arc<AccountRow>> {
        self.accounts.read().await.get(&id).cloned()
    }

    async fn account_exists(&self, id: i64) -> bool {
        self.accounts.read().await.contains_key(&id)
    }
}

/// Ledger held entirely in memory
#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<Inner>,
}

impl MemoryLedger {
    /// Create an empty ledger. A unit of work waits at most `lock_timeout`
    /// for each row lock.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                lock_timeout,
                commit_gate: RwLock::new(()),
                users: RwLock::new(BTreeMap::new()),
                accounts: RwLock::new(BTreeMap::new()),
                transfers: RwLock::new(Vec::new()),
                entries: RwLock::new(Vec::new()),
                next_account_id: AtomicI64::new(1),
                next_transfer_id: AtomicI64::new(1),
                next_entry_id: AtomicI64::new(1),
            }),
        }
    }

    /// Number of committed transfer records
    pub async fn transfer_count(&self) -> usize {
        self.inner.transfers.read().await.len()
    }

    /// Number of committed entries
    pub async fn entry_count(&self) -> usize {
        self.inner.entries.read().await.len()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

fn window<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> LedgerResult<()> {
        Ok(())
    }

    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            held: BTreeMap::new(),
            transfers: Vec::new(),
            entries: Vec::new(),
        }))
    }

    async fn create_user(&self, user: NewUser) -> LedgerResult<User> {
        let mut users = self.inner.users.write().await;
        if users.contains_key(&user.username) {
            return Err(LedgerError::Conflict("users_pkey".to_string()));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(LedgerError::Conflict("users_email_key".to_string()));
        }

        let created = User {
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            created_at: Utc::now(),
        };
        users.insert(created.username.clone(), created.clone());
        Ok(created)
    }

    async fn get_user(&self, username: &str) -> LedgerResult<User> {
        self.inner
            .users
            .read()
            .await
            .get(username)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("User {}", username)))
    }

    async fn create_account(&self, account: NewAccount) -> LedgerResult<Account> {
        account.validate()?;

        if !self.inner.users.read().await.contains_key(&account.owner) {
            return Err(LedgerError::NotFound(
                "Referenced record (accounts_owner_fkey)".to_string(),
            ));
        }

        let mut accounts = self.inner.accounts.write().await;
        for row in accounts.values() {
            let existing = row.committed.read().await;
            if existing.owner == account.owner && existing.currency == account.currency {
                return Err(LedgerError::Conflict("owner_currency_key".to_string()));
            }
        }

        let created = Account {
            id: self.inner.next_account_id.fetch_add(1, Ordering::SeqCst),
            owner: account.owner,
            balance: account.balance,
            currency: account.currency,
            created_at: Utc::now(),
        };
        accounts.insert(
            created.id,
            Arc::new(AccountRow {
                lock: Arc::new(Mutex::new(())),
                committed: RwLock::new(created.clone()),
            }),
        );
        Ok(created)
    }

    async fn get_account(&self, id: i64) -> LedgerResult<Account> {
        let _visible = self.inner.commit_gate.read().await;
        let row = self
            .inner
            .row(id)
            .await
            .ok_or(LedgerError::AccountNotFound(id))?;
        let account = row.committed.read().await.clone();
        Ok(account)
    }

    async fn list_accounts(&self, owner: Option<&str>, page: Page) -> LedgerResult<Vec<Account>> {
        let _visible = self.inner.commit_gate.read().await;
        let rows: Vec<Arc<AccountRow>> = self.inner.accounts.read().await.values().cloned().collect();
        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let account = row.committed.read().await.clone();
            if owner.is_none_or(|o| account.owner == o) {
                accounts.push(account);
            }
        }
        Ok(window(accounts.into_iter(), page))
    }

    async fn get_entry(&self, id: i64) -> LedgerResult<Entry> {
        let _visible = self.inner.commit_gate.read().await;
        self.inner
            .entries
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("Entry {}", id)))
    }

    async fn list_entries(&self, account_id: i64, page: Page) -> LedgerResult<Vec<Entry>> {
        let _visible = self.inner.commit_gate.read().await;
        let entries = self.inner.entries.read().await;
        let mut matching: Vec<Entry> = entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.id);
        Ok(window(matching.into_iter(), page))
    }

    async fn get_transfer(&self, id: i64) -> LedgerResult<Transfer> {
        let _visible = self.inner.commit_gate.read().await;
        self.inner
            .transfers
            .read()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("Transfer {}", id)))
    }

    async fn list_transfers(
        &self,
        filter: TransferFilter,
        page: Page,
    ) -> LedgerResult<Vec<Transfer>> {
        let _visible = self.inner.commit_gate.read().await;
        let transfers = self.inner.transfers.read().await;
        let mut matching: Vec<Transfer> = transfers
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.id);
        Ok(window(matching.into_iter(), page))
    }
}

/// Row locked by a unit of work, with the unit's private copy of it
struct HeldRow {
    row: Arc<AccountRow>,
    _guard: OwnedMutexGuard<()>,
    working: Account,
}

/// Unit of work over a `MemoryLedger`
pub struct MemoryTx {
    inner: Arc<Inner>,
    held: BTreeMap<i64, HeldRow>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_account(&mut self, id: i64) -> LedgerResult<Account> {
        if let Some(held) = self.held.get(&id) {
            return Ok(held.working.clone());
        }

        let row = self
            .inner
            .row(id)
            .await
            .ok_or(LedgerError::AccountNotFound(id))?;

        let guard = tokio::time::timeout(self.inner.lock_timeout, row.lock.clone().lock_owned())
            .await
            .map_err(|_| LedgerError::LockTimeout(id))?;

        let working = row.committed.read().await.clone();
        self.held.insert(
            id,
            HeldRow {
                row,
                _guard: guard,
                working: working.clone(),
            },
        );
        Ok(working)
    }

    async fn insert_transfer(&mut self, params: TransferParams) -> LedgerResult<Transfer> {
        if params.amount <= 0 {
            return Err(LedgerError::Validation(
                "constraint transfers_amount_check violated".to_string(),
            ));
        }
        for id in [params.from_account_id, params.to_account_id] {
            if !self.inner.account_exists(id).await {
                return Err(LedgerError::AccountNotFound(id));
            }
        }

        let transfer = Transfer {
            id: self.inner.next_transfer_id.fetch_add(1, Ordering::SeqCst),
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn insert_entry(&mut self, account_id: i64, amount: i64) -> LedgerResult<Entry> {
        if !self.inner.account_exists(account_id).await {
            return Err(LedgerError::AccountNotFound(account_id));
        }

        let entry = Entry {
            id: self.inner.next_entry_id.fetch_add(1, Ordering::SeqCst),
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn add_balance(&mut self, id: i64, delta: i64) -> LedgerResult<Account> {
        // An update takes the row lock if the unit does not hold it yet
        self.lock_account(id).await?;

        let held = self
            .held
            .get_mut(&id)
            .ok_or(LedgerError::AccountNotFound(id))?;
        held.working.balance = held
            .working
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Validation(format!("balance overflow on account {}", id)))?;
        Ok(held.working.clone())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryTx {
            inner,
            held,
            transfers,
            entries,
        } = *self;

        // Gate first, then logs, then rows
        let publishing = inner.commit_gate.write().await;
        let mut transfer_log = inner.transfers.write().await;
        let mut entry_log = inner.entries.write().await;
        for held_row in held.values() {
            *held_row.row.committed.write().await = held_row.working.clone();
        }
        transfer_log.extend(transfers);
        entry_log.extend(entries);
        drop(entry_log);
        drop(transfer_log);
        drop(publishing);

        // Row locks are released here
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::Currency;

    async fn seeded() -> (MemoryLedger, Account, Account) {
        let ledger = MemoryLedger::default();
        ledger
            .create_user(NewUser {
                username: "alice".into(),
                full_name: "Alice".into(),
                email: "alice@example.com".into(),
            })
            .await
            .unwrap();
        let a = ledger
            .create_account(NewAccount {
                owner: "alice".into(),
                balance: 100,
                currency: Currency::USD,
            })
            .await
            .unwrap();
        let b = ledger
            .create_account(NewAccount {
                owner: "alice".into(),
                balance: 50,
                currency: Currency::EUR,
            })
            .await
            .unwrap();
        (ledger, a, b)
    }

    #[tokio::test]
    async fn test_create_account_requires_existing_owner() {
        let ledger = MemoryLedger::default();
        let err = ledger
            .create_account(NewAccount {
                owner: "nobody".into(),
                balance: 0,
                currency: Currency::USD,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_one_account_per_owner_and_currency() {
        let (ledger, _, _) = seeded().await;
        let err = ledger
            .create_account(NewAccount {
                owner: "alice".into(),
                balance: 0,
                currency: Currency::USD,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_user_email_conflicts() {
        let (ledger, _, _) = seeded().await;
        let err = ledger
            .create_user(NewUser {
                username: "alice2".into(),
                full_name: "Alice Again".into(),
                email: "alice@example.com".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let (ledger, a, b) = seeded().await;

        let mut tx = ledger.begin().await.unwrap();
        tx.lock_account(a.id).await.unwrap();
        tx.insert_transfer(TransferParams {
            from_account_id: a.id,
            to_account_id: b.id,
            amount: 10,
        })
        .await
        .unwrap();
        tx.insert_entry(a.id, -10).await.unwrap();
        let updated = tx.add_balance(a.id, -10).await.unwrap();
        assert_eq!(updated.balance, 90);

        // Reader is not blocked by the row lock and sees the committed state
        assert_eq!(ledger.get_account(a.id).await.unwrap().balance, 100);
        assert_eq!(ledger.transfer_count().await, 0);

        drop(tx);
        assert_eq!(ledger.get_account(a.id).await.unwrap().balance, 100);
        assert_eq!(ledger.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let (ledger, a, _) = seeded().await;

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_entry(a.id, 25).await.unwrap();
        tx.add_balance(a.id, 25).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(ledger.get_account(a.id).await.unwrap().balance, 125);
        let entries = ledger
            .list_entries(a.id, Page { offset: 0, limit: 10 })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, 25);
    }

    #[tokio::test]
    async fn test_row_lock_times_out() {
        let ledger = MemoryLedger::new(Duration::from_millis(50));
        ledger
            .create_user(NewUser {
                username: "bob".into(),
                full_name: "Bob".into(),
                email: "bob@example.com".into(),
            })
            .await
            .unwrap();
        let account = ledger
            .create_account(NewAccount {
                owner: "bob".into(),
                balance: 10,
                currency: Currency::CAD,
            })
            .await
            .unwrap();

        let mut holder = ledger.begin().await.unwrap();
        holder.lock_account(account.id).await.unwrap();

        let mut waiter = ledger.begin().await.unwrap();
        let err = waiter.lock_account(account.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::LockTimeout(id) if id == account.id));

        holder.rollback().await.unwrap();
        assert!(waiter.lock_account(account.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_missing_account() {
        let ledger = MemoryLedger::default();
        let mut tx = ledger.begin().await.unwrap();
        let err = tx.lock_account(99).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(99)));
    }

    #[tokio::test]
    async fn test_list_accounts_pagination_and_owner_filter() {
        let (ledger, a, b) = seeded().await;

        let all = ledger
            .list_accounts(None, Page { offset: 0, limit: 5 })
            .await
            .unwrap();
        assert_eq!(all.iter().map(|x| x.id).collect::<Vec<_>>(), vec![a.id, b.id]);

        let second = ledger
            .list_accounts(Some("alice"), Page { offset: 1, limit: 5 })
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, b.id);

        let none = ledger
            .list_accounts(Some("carol"), Page { offset: 0, limit: 5 })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_half_a_commit() {
        use crate::ledger::engine::{BalancePolicy, TransferEngine};

        let ledger = Arc::new(MemoryLedger::default());
        let mut ids = Vec::new();
        for owner in ["payer", "payee"] {
            ledger
                .create_user(NewUser {
                    username: owner.into(),
                    full_name: owner.into(),
                    email: format!("{}@example.com", owner),
                })
                .await
                .unwrap();
            let account = ledger
                .create_account(NewAccount {
                    owner: owner.into(),
                    balance: 500,
                    currency: Currency::USD,
                })
                .await
                .unwrap();
            ids.push(account.id);
        }
        let (a, b) = (ids[0], ids[1]);
        let engine = TransferEngine::new(ledger.clone(), BalancePolicy::default());

        let mut writers = Vec::new();
        for i in 0..200 {
            let engine = engine.clone();
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            writers.push(tokio::spawn(async move {
                engine
                    .transfer(TransferParams {
                        from_account_id: from,
                        to_account_id: to,
                        amount: 1,
                    })
                    .await
            }));
        }

        let reader = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let mut observed = 0;
                while observed < 2000 {
                    let accounts = ledger
                        .list_accounts(None, Page { offset: 0, limit: 10 })
                        .await
                        .unwrap();
                    let total: i64 = accounts.iter().map(|x| x.balance).sum();
                    assert_eq!(total, 1000, "balances out of step mid-commit");
                    observed += 1;
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap().unwrap();
        }
        reader.await.unwrap();

        // Entries of every committed transfer are published with it
        assert_eq!(ledger.entry_count().await, 2 * ledger.transfer_count().await);
    }
}
