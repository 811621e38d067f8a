//! pdk-engine
//!
//! The ledger engine service: the single write authority over an
//! account's cash and holdings.
//!
//! Orchestration only — the accounting rules live in `pdk-ledger`, and
//! persistence lives behind the [`HoldingsStore`] / [`TransactionLog`]
//! traits so the same engine runs against the in-memory store
//! (`pdk-store-mem`) and Postgres (`pdk-db`).
//!
//! Concurrency model: operations on different accounts are independent;
//! operations on one account are serialized by optimistic concurrency —
//! every load carries a version stamp, every save checks it, and the
//! engine re-runs its whole load/apply/save cycle on a conflict (bounded
//! by config). Lost updates are impossible by construction.

mod engine;
mod store;

pub use engine::{AccountValuation, EngineError, LedgerEngine, TradeReceipt};
pub use store::{
    HistoryQuery, HoldingsStore, SortOrder, StoreError, TransactionLog, Versioned,
};
