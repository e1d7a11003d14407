//! Transfer Engine
//!
//! Moves funds between two accounts as one unit of work:
//!
//! ```text
//! begin
//!   lock rows (ascending id)  -> AccountNotFound
//!   check currency / funds    -> CurrencyMismatch / InsufficientFunds
//!   insert transfer
//!   insert entry (-amount, from) and entry (+amount, to)
//!   add_balance (ascending id)
//! commit                      (any error above: rollback)
//! ```
//!
//! Row locks are always taken lowest account id first, independent of
//! which side is debited. Two transfers between the same pair of accounts
//! in opposite directions therefore queue on the same first lock instead of
//! each holding one row and waiting for the other.

use std::sync::Arc;

use super::error::LedgerError;
use super::models::{Account, TransferParams, TransferResult};
use super::store::{LedgerResult, LedgerStore, LedgerTx};

/// Overdraft policy applied to the debited account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BalancePolicy {
    /// Let a transfer drive the source balance below zero
    pub allow_overdraft: bool,
}

/// Executes transfers against a `LedgerStore`
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
    policy: BalancePolicy,
}

/// Account ids in the order their rows must be locked and updated
pub fn lock_order(a: i64, b: i64) -> (i64, i64) {
    if a <= b { (a, b) } else { (b, a) }
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>, policy: BalancePolicy) -> Self {
        Self { store, policy }
    }

    /// Execute one transfer atomically.
    ///
    /// Callers are expected to have checked that both accounts use the
    /// requested currency; the engine still refuses to move funds between
    /// accounts of different currencies.
    ///
    /// There is no idempotency key: every successful call creates a new
    /// transfer.
    #[tracing::instrument(
        name = "transfer",
        skip(self),
        fields(
            from = params.from_account_id,
            to = params.to_account_id,
            amount = params.amount
        )
    )]
    pub async fn transfer(&self, params: TransferParams) -> LedgerResult<TransferResult> {
        validate(&params)?;

        let mut tx = self.store.begin().await?;
        match self.apply(tx.as_mut(), params).await {
            Ok(result) => {
                tx.commit().await?;
                tracing::info!(
                    transfer_id = result.transfer.id,
                    from_balance = result.from_account.balance,
                    to_balance = result.to_account.balance,
                    "Transfer committed"
                );
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                tracing::warn!(error = %e, "Transfer rolled back");
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn LedgerTx,
        params: TransferParams,
    ) -> LedgerResult<TransferResult> {
        let TransferParams {
            from_account_id: from,
            to_account_id: to,
            amount,
        } = params;
        let (first, second) = lock_order(from, to);

        let first_locked = tx.lock_account(first).await?;
        let second_locked = tx.lock_account(second).await?;
        let (from_locked, to_locked) = by_role(from, first_locked, second_locked);

        if from_locked.currency != to_locked.currency {
            return Err(LedgerError::CurrencyMismatch {
                from: from_locked.currency,
                to: to_locked.currency,
            });
        }
        if !self.policy.allow_overdraft && from_locked.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account_id: from,
                balance: from_locked.balance,
                required: amount,
            });
        }

        let transfer = tx.insert_transfer(params).await?;
        let from_entry = tx.insert_entry(from, -amount).await?;
        let to_entry = tx.insert_entry(to, amount).await?;

        let delta = |id: i64| if id == from { -amount } else { amount };
        let first_updated = tx.add_balance(first, delta(first)).await?;
        let second_updated = tx.add_balance(second, delta(second)).await?;
        let (from_account, to_account) = by_role(from, first_updated, second_updated);

        Ok(TransferResult {
            transfer,
            from_entry,
            to_entry,
            from_account,
            to_account,
        })
    }
}

fn validate(params: &TransferParams) -> LedgerResult<()> {
    if params.from_account_id == params.to_account_id {
        return Err(LedgerError::SelfTransfer);
    }
    if params.amount <= 0 {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

/// Split a lock-ordered pair back into (from, to)
fn by_role(from: i64, first: Account, second: Account) -> (Account, Account) {
    if first.id == from {
        (first, second)
    } else {
        (second, first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryLedger;
    use crate::ledger::models::{Currency, NewAccount, NewUser, Page, TransferFilter};
    use crate::util::random;
    use std::time::Duration;

    struct TestHarness {
        ledger: Arc<MemoryLedger>,
        engine: TransferEngine,
    }

    impl TestHarness {
        fn new() -> Self {
            Self::with_policy(BalancePolicy::default())
        }

        fn with_policy(policy: BalancePolicy) -> Self {
            let ledger = Arc::new(MemoryLedger::new(Duration::from_secs(5)));
            let engine = TransferEngine::new(ledger.clone(), policy);
            Self { ledger, engine }
        }

        async fn account(&self, balance: i64, currency: Currency) -> Account {
            let owner = random::random_owner();
            self.ledger
                .create_user(NewUser {
                    username: owner.clone(),
                    full_name: random::random_string(10),
                    email: format!("{}@example.com", owner),
                })
                .await
                .unwrap();
            self.ledger
                .create_account(NewAccount {
                    owner,
                    balance,
                    currency,
                })
                .await
                .unwrap()
        }

        async fn balance(&self, id: i64) -> i64 {
            self.ledger.get_account(id).await.unwrap().balance
        }
    }

    fn params(from: &Account, to: &Account, amount: i64) -> TransferParams {
        TransferParams {
            from_account_id: from.id,
            to_account_id: to.id,
            amount,
        }
    }

    #[test]
    fn test_lock_order_is_ascending() {
        assert_eq!(lock_order(3, 7), (3, 7));
        assert_eq!(lock_order(7, 3), (3, 7));
    }

    // ========================================================================
    // Happy Path
    // ========================================================================

    #[tokio::test]
    async fn test_transfer_moves_funds() {
        let h = TestHarness::new();
        let a = h.account(100, Currency::USD).await;
        let b = h.account(50, Currency::USD).await;

        let result = h.engine.transfer(params(&a, &b, 30)).await.unwrap();

        assert_eq!(result.transfer.from_account_id, a.id);
        assert_eq!(result.transfer.to_account_id, b.id);
        assert_eq!(result.transfer.amount, 30);
        assert_eq!(result.from_entry.account_id, a.id);
        assert_eq!(result.from_entry.amount, -30);
        assert_eq!(result.to_entry.account_id, b.id);
        assert_eq!(result.to_entry.amount, 30);
        assert_eq!(result.from_account.balance, 70);
        assert_eq!(result.to_account.balance, 80);

        assert_eq!(h.balance(a.id).await, 70);
        assert_eq!(h.balance(b.id).await, 80);
        assert_eq!(h.ledger.transfer_count().await, 1);
        assert_eq!(h.ledger.entry_count().await, 2);

        let stored = h.ledger.get_transfer(result.transfer.id).await.unwrap();
        assert_eq!(stored, result.transfer);
        let stored_entry = h.ledger.get_entry(result.to_entry.id).await.unwrap();
        assert_eq!(stored_entry, result.to_entry);
    }

    #[tokio::test]
    async fn test_transfer_from_higher_to_lower_id() {
        let h = TestHarness::new();
        let low = h.account(10, Currency::EUR).await;
        let high = h.account(90, Currency::EUR).await;
        assert!(low.id < high.id);

        let result = h.engine.transfer(params(&high, &low, 40)).await.unwrap();
        assert_eq!(result.from_account.id, high.id);
        assert_eq!(result.from_account.balance, 50);
        assert_eq!(result.to_account.id, low.id);
        assert_eq!(result.to_account.balance, 50);
    }

    #[tokio::test]
    async fn test_transfer_of_entire_balance() {
        let h = TestHarness::new();
        let a = h.account(25, Currency::CAD).await;
        let b = h.account(0, Currency::CAD).await;

        let result = h.engine.transfer(params(&a, &b, 25)).await.unwrap();
        assert_eq!(result.from_account.balance, 0);
        assert_eq!(result.to_account.balance, 25);
    }

    #[tokio::test]
    async fn test_random_transfers_conserve_total() {
        let h = TestHarness::new();
        let a = h.account(random::random_money(), Currency::USD).await;
        let b = h.account(random::random_money(), Currency::USD).await;
        let total = a.balance + b.balance;

        for _ in 0..20 {
            let amount = random::random_int(1, 100);
            let (from, to) = if random::random_int(0, 1) == 0 {
                (&a, &b)
            } else {
                (&b, &a)
            };
            let before_from = h.balance(from.id).await;
            let before_to = h.balance(to.id).await;

            match h.engine.transfer(params(from, to, amount)).await {
                Ok(result) => {
                    assert_eq!(before_from - result.from_account.balance, amount);
                    assert_eq!(result.to_account.balance - before_to, amount);
                    assert_eq!(result.from_entry.amount + result.to_entry.amount, 0);
                }
                Err(LedgerError::InsufficientFunds { .. }) => {
                    assert!(before_from < amount);
                    assert_eq!(h.balance(from.id).await, before_from);
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
            assert_eq!(h.balance(a.id).await + h.balance(b.id).await, total);
        }
    }

    // ========================================================================
    // Rejections
    // ========================================================================

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let h = TestHarness::new();
        let a = h.account(100, Currency::USD).await;

        let err = h.engine.transfer(params(&a, &a, 10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::SelfTransfer));
        assert_eq!(h.balance(a.id).await, 100);
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let h = TestHarness::new();
        let a = h.account(100, Currency::USD).await;
        let b = h.account(100, Currency::USD).await;

        for amount in [0, -5] {
            let err = h.engine.transfer(params(&a, &b, amount)).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount));
        }
        assert_eq!(h.ledger.transfer_count().await, 0);
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_ledger_untouched() {
        let h = TestHarness::new();
        let a = h.account(20, Currency::USD).await;
        let b = h.account(5, Currency::USD).await;

        let err = h.engine.transfer(params(&a, &b, 21)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                balance: 20,
                required: 21,
                ..
            }
        ));
        assert_eq!(h.balance(a.id).await, 20);
        assert_eq!(h.balance(b.id).await, 5);
        assert_eq!(h.ledger.transfer_count().await, 0);
        assert_eq!(h.ledger.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_overdraft_policy_allows_negative_balance() {
        let h = TestHarness::with_policy(BalancePolicy {
            allow_overdraft: true,
        });
        let a = h.account(10, Currency::USD).await;
        let b = h.account(0, Currency::USD).await;

        let result = h.engine.transfer(params(&a, &b, 35)).await.unwrap();
        assert_eq!(result.from_account.balance, -25);
        assert_eq!(result.to_account.balance, 35);
    }

    #[tokio::test]
    async fn test_missing_account_rejected() {
        let h = TestHarness::new();
        let b = h.account(10, Currency::USD).await;

        let err = h
            .engine
            .transfer(TransferParams {
                from_account_id: 9999,
                to_account_id: b.id,
                amount: 10,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(9999)));

        let err = h
            .engine
            .transfer(TransferParams {
                from_account_id: b.id,
                to_account_id: 9999,
                amount: 10,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(9999)));
        assert_eq!(h.balance(b.id).await, 10);
        assert_eq!(h.ledger.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_currency_mismatch_rejected() {
        let h = TestHarness::new();
        let usd = h.account(100, Currency::USD).await;
        let eur = h.account(100, Currency::EUR).await;

        let err = h.engine.transfer(params(&usd, &eur, 10)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::CurrencyMismatch {
                from: Currency::USD,
                to: Currency::EUR
            }
        ));
        assert_eq!(h.balance(usd.id).await, 100);
        assert_eq!(h.balance(eur.id).await, 100);
    }

    #[tokio::test]
    async fn test_lock_timeout_fails_without_writes() {
        let ledger = Arc::new(MemoryLedger::new(Duration::from_millis(50)));
        let engine = TransferEngine::new(ledger.clone(), BalancePolicy::default());
        let h = TestHarness {
            ledger: ledger.clone(),
            engine,
        };
        let a = h.account(100, Currency::USD).await;
        let b = h.account(100, Currency::USD).await;

        let mut blocker = ledger.begin().await.unwrap();
        blocker.lock_account(b.id).await.unwrap();

        let err = h.engine.transfer(params(&a, &b, 10)).await.unwrap_err();
        assert!(err.is_retryable());
        blocker.rollback().await.unwrap();

        assert_eq!(h.balance(a.id).await, 100);
        assert_eq!(h.ledger.transfer_count().await, 0);

        // Same request succeeds once the lock is free
        h.engine.transfer(params(&a, &b, 10)).await.unwrap();
        assert_eq!(h.balance(a.id).await, 90);
    }

    // ========================================================================
    // Concurrency
    // ========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transfers_have_no_lost_updates() {
        let h = TestHarness::new();
        let a = h.account(1_000, Currency::USD).await;
        let b = h.account(1_000, Currency::USD).await;
        let n = 20;
        let amount = 10;

        let mut handles = Vec::with_capacity(n);
        for _ in 0..n {
            let engine = h.engine.clone();
            let p = params(&a, &b, amount);
            handles.push(tokio::spawn(async move { engine.transfer(p).await }));
        }

        let mut seen_from_balances = Vec::with_capacity(n);
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.transfer.amount, amount);
            assert_eq!(result.from_entry.amount, -amount);
            assert_eq!(result.to_entry.amount, amount);
            // from_account balance after each step is unique: 990, 980, ...
            let diff = a.balance - result.from_account.balance;
            assert_eq!(diff % amount, 0);
            seen_from_balances.push(result.from_account.balance);
        }
        seen_from_balances.sort_unstable();
        seen_from_balances.dedup();
        assert_eq!(seen_from_balances.len(), n);

        assert_eq!(h.balance(a.id).await, 1_000 - n as i64 * amount);
        assert_eq!(h.balance(b.id).await, 1_000 + n as i64 * amount);
        assert_eq!(h.ledger.transfer_count().await, n);
        assert_eq!(h.ledger.entry_count().await, 2 * n);

        let page = Page { offset: 0, limit: 100 };
        let transfers = h
            .ledger
            .list_transfers(
                TransferFilter {
                    from_account_id: a.id,
                    to_account_id: b.id,
                },
                page,
            )
            .await
            .unwrap();
        assert_eq!(transfers.len(), n);
        let entries_a = h.ledger.list_entries(a.id, page).await.unwrap();
        assert_eq!(entries_a.iter().map(|e| e.amount).sum::<i64>(), -(n as i64) * amount);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_direction_transfers_do_not_deadlock() {
        let h = TestHarness::new();
        let a = h.account(500, Currency::USD).await;
        let b = h.account(500, Currency::USD).await;
        let n = 20;
        let amount = 10;

        let mut handles = Vec::with_capacity(n);
        for i in 0..n {
            let engine = h.engine.clone();
            let p = if i % 2 == 0 {
                params(&a, &b, amount)
            } else {
                params(&b, &a, amount)
            };
            handles.push(tokio::spawn(async move { engine.transfer(p).await }));
        }

        let all = async {
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(10), all)
            .await
            .expect("transfers deadlocked");

        // Equal number each way: balances end where they started
        assert_eq!(h.balance(a.id).await, 500);
        assert_eq!(h.balance(b.id).await, 500);
        assert_eq!(h.ledger.transfer_count().await, n);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overdraw_attempts_stop_at_zero() {
        let h = TestHarness::new();
        let a = h.account(50, Currency::USD).await;
        let b = h.account(0, Currency::USD).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = h.engine.clone();
            let p = params(&a, &b, 10);
            handles.push(tokio::spawn(async move { engine.transfer(p).await }));
        }

        let mut ok = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::InsufficientFunds { .. }) => insufficient += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(ok, 5);
        assert_eq!(insufficient, 5);
        assert_eq!(h.balance(a.id).await, 0);
        assert_eq!(h.balance(b.id).await, 50);
    }
}
