//! Storage seams for the ledger engine.
//!
//! The store is the only shared mutable resource in the system, and the
//! only place an all-or-nothing commit can actually be enforced, so
//! `save` takes the new account state **and** the transaction to
//! append: implementations persist both in one atomic unit or fail
//! without effect. The read-only history side is a separate, narrower
//! trait.

use pdk_schemas::{AccountId, AccountState, Transaction};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by store implementations.
#[derive(Debug)]
pub enum StoreError {
    /// No account with the requested id.
    NotFound,
    /// The version stamp moved since `load`; the caller must re-run the
    /// whole load/apply/save cycle. Also returned by `create` when the
    /// account already exists.
    Conflict,
    /// Infrastructure failure (storage unreachable, IO error). Never to
    /// be swallowed as if the operation succeeded.
    Unavailable(anyhow::Error),
}

impl StoreError {
    pub fn unavailable(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Unavailable(err.into())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "account not found"),
            StoreError::Conflict => write!(f, "concurrent modification detected"),
            StoreError::Unavailable(err) => write!(f, "store unavailable: {err:#}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Unavailable(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Versioned state
// ---------------------------------------------------------------------------

/// A loaded value plus the version stamp that must be presented at save
/// time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

// ---------------------------------------------------------------------------
// History queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: usize,
    pub order: SortOrder,
}

impl HistoryQuery {
    pub fn newest_first(limit: usize) -> Self {
        Self {
            limit,
            order: SortOrder::NewestFirst,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Load/persist the `{account, holdings}` consistency unit.
#[async_trait::async_trait]
pub trait HoldingsStore: Send + Sync {
    /// Create a fresh account with the given starting cash.
    ///
    /// # Errors
    /// `Conflict` if an account with this id already exists.
    async fn create(
        &self,
        account_id: AccountId,
        starting_cash_micros: i64,
    ) -> Result<Versioned<AccountState>, StoreError>;

    async fn load(&self, account_id: AccountId) -> Result<Versioned<AccountState>, StoreError>;

    /// Persist `state` and append `transaction` as one atomic unit.
    ///
    /// # Errors
    /// `Conflict` if the stored version is not `expected_version`; in
    /// that case (and on `Unavailable`) nothing is persisted — there is
    /// no partial-commit state.
    async fn save(
        &self,
        account_id: AccountId,
        state: &AccountState,
        expected_version: u64,
        transaction: &Transaction,
    ) -> Result<(), StoreError>;
}

/// Read side of the append-only transaction log. There is deliberately
/// no update or delete surface.
#[async_trait::async_trait]
pub trait TransactionLog: Send + Sync {
    /// Transactions for one account, ordered per `query.order` and
    /// truncated to `query.limit`. Commit order is preserved — a
    /// single account's history is never reordered.
    async fn query(
        &self,
        account_id: AccountId,
        query: HistoryQuery,
    ) -> Result<Vec<Transaction>, StoreError>;
}
