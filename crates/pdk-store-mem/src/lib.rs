//! Deterministic in-memory ledger store.
//!
//! Backs the engine in tests and offline runs. A single mutex guards
//! the whole account map, so the save unit (state write + transaction
//! append) is trivially atomic and the per-account version stamp gives
//! the same optimistic-concurrency behavior as the Postgres store.
//!
//! Failure injection: `fail_next_save()` makes the next save return
//! `Unavailable` **before** touching anything, for exercising the
//! no-partial-commit contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use pdk_engine::{HistoryQuery, HoldingsStore, SortOrder, StoreError, TransactionLog, Versioned};
use pdk_schemas::{AccountId, AccountState, Transaction};

#[derive(Debug)]
struct StoredAccount {
    state: AccountState,
    version: u64,
    /// Commit order; never reordered, never truncated.
    log: Vec<Transaction>,
}

/// In-memory implementation of [`HoldingsStore`] and [`TransactionLog`].
#[derive(Debug, Default)]
pub struct MemLedgerStore {
    accounts: Mutex<HashMap<AccountId, StoredAccount>>,
    fail_next_save: AtomicBool,
}

impl MemLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts(&self) -> Result<std::sync::MutexGuard<'_, HashMap<AccountId, StoredAccount>>, StoreError> {
        self.accounts
            .lock()
            .map_err(|_| StoreError::unavailable(anyhow::anyhow!("store mutex poisoned")))
    }

    /// Make the next `save` fail with `Unavailable`, touching nothing.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Total transactions appended for an account (test assertions).
    pub fn transaction_count(&self, account_id: AccountId) -> usize {
        self.accounts
            .lock()
            .ok()
            .and_then(|a| a.get(&account_id).map(|s| s.log.len()))
            .unwrap_or(0)
    }

    /// Current version stamp for an account (test assertions).
    pub fn version(&self, account_id: AccountId) -> Option<u64> {
        self.accounts
            .lock()
            .ok()
            .and_then(|a| a.get(&account_id).map(|s| s.version))
    }
}

#[async_trait::async_trait]
impl HoldingsStore for MemLedgerStore {
    async fn create(
        &self,
        account_id: AccountId,
        starting_cash_micros: i64,
    ) -> Result<Versioned<AccountState>, StoreError> {
        let mut accounts = self.accounts()?;
        if accounts.contains_key(&account_id) {
            return Err(StoreError::Conflict);
        }
        let state = AccountState::new(account_id, starting_cash_micros);
        accounts.insert(
            account_id,
            StoredAccount {
                state: state.clone(),
                version: 1,
                log: Vec::new(),
            },
        );
        Ok(Versioned { value: state, version: 1 })
    }

    async fn load(&self, account_id: AccountId) -> Result<Versioned<AccountState>, StoreError> {
        let accounts = self.accounts()?;
        let stored = accounts.get(&account_id).ok_or(StoreError::NotFound)?;
        Ok(Versioned {
            value: stored.state.clone(),
            version: stored.version,
        })
    }

    async fn save(
        &self,
        account_id: AccountId,
        state: &AccountState,
        expected_version: u64,
        transaction: &Transaction,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts()?;
        let stored = accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict);
        }
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(StoreError::unavailable(anyhow::anyhow!(
                "injected save failure"
            )));
        }
        stored.state = state.clone();
        stored.version += 1;
        stored.log.push(transaction.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl TransactionLog for MemLedgerStore {
    async fn query(
        &self,
        account_id: AccountId,
        query: HistoryQuery,
    ) -> Result<Vec<Transaction>, StoreError> {
        let accounts = self.accounts()?;
        let stored = accounts.get(&account_id).ok_or(StoreError::NotFound)?;
        let out: Vec<Transaction> = match query.order {
            SortOrder::NewestFirst => stored.log.iter().rev().take(query.limit).cloned().collect(),
            SortOrder::OldestFirst => stored.log.iter().take(query.limit).cloned().collect(),
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pdk_schemas::TradeSide;
    use uuid::Uuid;

    fn txn(account_id: AccountId, symbol: &str) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            account_id,
            symbol: symbol.to_string(),
            side: TradeSide::Buy,
            quantity: 1,
            price_micros: 1_000_000,
            total_value_micros: 1_000_000,
            executed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_is_rejected_for_existing_account() {
        let store = MemLedgerStore::new();
        let id = Uuid::new_v4();
        store.create(id, 100).await.unwrap();
        assert!(matches!(
            store.create(id, 100).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn load_unknown_account_is_not_found() {
        let store = MemLedgerStore::new();
        assert!(matches!(
            store.load(Uuid::new_v4()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn save_with_stale_version_conflicts_without_effect() {
        let store = MemLedgerStore::new();
        let id = Uuid::new_v4();
        let v = store.create(id, 500).await.unwrap();

        // First save at the loaded version: ok, bumps to 2.
        let mut state = v.value.clone();
        state.account.cash_micros = 400;
        store.save(id, &state, v.version, &txn(id, "A")).await.unwrap();
        assert_eq!(store.version(id), Some(2));

        // Replay at the stale version: conflict, nothing changes.
        let mut stale = v.value.clone();
        stale.account.cash_micros = 0;
        let err = store.save(id, &stale, v.version, &txn(id, "B")).await;
        assert!(matches!(err, Err(StoreError::Conflict)));
        assert_eq!(store.version(id), Some(2));
        assert_eq!(store.transaction_count(id), 1);
        assert_eq!(store.load(id).await.unwrap().value.account.cash_micros, 400);
    }

    #[tokio::test]
    async fn injected_failure_leaves_no_partial_state() {
        let store = MemLedgerStore::new();
        let id = Uuid::new_v4();
        let v = store.create(id, 500).await.unwrap();

        store.fail_next_save();
        let mut state = v.value.clone();
        state.account.cash_micros = 1;
        let err = store.save(id, &state, v.version, &txn(id, "A")).await;
        assert!(matches!(err, Err(StoreError::Unavailable(_))));

        let after = store.load(id).await.unwrap();
        assert_eq!(after.value, v.value);
        assert_eq!(after.version, v.version);
        assert_eq!(store.transaction_count(id), 0);

        // The injection is one-shot: the next save succeeds.
        store.save(id, &state, v.version, &txn(id, "A")).await.unwrap();
        assert_eq!(store.transaction_count(id), 1);
    }

    #[tokio::test]
    async fn query_orders_and_limits() {
        let store = MemLedgerStore::new();
        let id = Uuid::new_v4();
        let mut v = store.create(id, 500).await.unwrap();
        for sym in ["A", "B", "C"] {
            store.save(id, &v.value, v.version, &txn(id, sym)).await.unwrap();
            v.version += 1;
        }

        let newest = store.query(id, HistoryQuery::newest_first(2)).await.unwrap();
        let symbols: Vec<_> = newest.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["C", "B"]);

        let oldest = store
            .query(
                id,
                HistoryQuery {
                    limit: 10,
                    order: SortOrder::OldestFirst,
                },
            )
            .await
            .unwrap();
        let symbols: Vec<_> = oldest.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B", "C"]);
    }
}
