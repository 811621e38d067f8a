//! The ledger engine service surface: execute / valuate / history /
//! open_account.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use pdk_config::LedgerConfig;
use pdk_ledger::{execute_trade, value_positions, PortfolioValuation, Rejection, MICROS_SCALE};
use pdk_md::{collect_marks, QuoteProvider};
use pdk_schemas::{AccountId, AccountState, TradeRequest, Transaction};

use crate::store::{HistoryQuery, HoldingsStore, StoreError, TransactionLog, Versioned};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything `LedgerEngine` operations can return besides success.
///
/// Rejections and consistency outcomes are routine results the caller
/// branches on; only `Storage` is a genuine fault.
#[derive(Debug)]
pub enum EngineError {
    /// Input error or business-rule rejection; no state was touched.
    Rejected(Rejection),
    /// The request targets a nonexistent account. Not retryable.
    AccountNotFound(AccountId),
    /// `open_account` for an id that already has an account.
    AccountExists(AccountId),
    /// Optimistic-concurrency retries exhausted; the caller may retry
    /// the whole request.
    Conflict { attempts: u32 },
    /// A configured value is unusable (e.g. starting cash does not fit
    /// the micros range). Operator-correctable, not retryable.
    Config { message: &'static str },
    /// Storage infrastructure failure, propagated — never swallowed as
    /// a successful trade.
    Storage(anyhow::Error),
}

impl From<Rejection> for EngineError {
    fn from(r: Rejection) -> Self {
        EngineError::Rejected(r)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Rejected(r) => write!(f, "{r}"),
            EngineError::AccountNotFound(id) => write!(f, "account not found: {id}"),
            EngineError::AccountExists(id) => write!(f, "account already exists: {id}"),
            EngineError::Conflict { attempts } => {
                write!(f, "concurrent modification persisted across {attempts} attempts")
            }
            EngineError::Config { message } => write!(f, "invalid configuration: {message}"),
            EngineError::Storage(err) => write!(f, "storage failure: {err:#}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Rejected(r) => Some(r),
            EngineError::Storage(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Returned by a successful `execute`: the committed state, the appended
/// transaction, and the realized PnL for sells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeReceipt {
    pub state: AccountState,
    pub transaction: Transaction,
    pub realized_pnl_micros: Option<i64>,
}

/// Read-side account valuation.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountValuation {
    pub account_id: AccountId,
    pub cash_micros: i64,
    pub valuation: PortfolioValuation,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The single authority for mutating an account's cash and holdings.
///
/// Holds its collaborators behind trait objects; the oracle is consulted
/// only by the read side (`valuate`), never on the execute path — fill
/// prices arrive with the request.
pub struct LedgerEngine {
    store: Arc<dyn HoldingsStore>,
    log: Arc<dyn TransactionLog>,
    quotes: Arc<dyn QuoteProvider>,
    config: LedgerConfig,
}

impl LedgerEngine {
    pub fn new(
        store: Arc<dyn HoldingsStore>,
        log: Arc<dyn TransactionLog>,
        quotes: Arc<dyn QuoteProvider>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            log,
            quotes,
            config,
        }
    }

    /// Open a new account with the configured starting cash.
    pub async fn open_account(&self, account_id: AccountId) -> Result<AccountState, EngineError> {
        let starting_cash_micros = self
            .config
            .starting_cash_units
            .checked_mul(MICROS_SCALE)
            .ok_or(EngineError::Config {
                message: "starting_cash_units does not fit the micros range",
            })?;
        let created = self
            .store
            .create(account_id, starting_cash_micros)
            .await
            .map_err(|err| match err {
                StoreError::Conflict => EngineError::AccountExists(account_id),
                StoreError::NotFound => EngineError::AccountNotFound(account_id),
                StoreError::Unavailable(e) => EngineError::Storage(e),
            })?;
        tracing::info!(account_id = %account_id, cash_micros = starting_cash_micros, "account opened");
        Ok(created.value)
    }

    /// Validate and execute one simulated trade.
    ///
    /// Load, apply, save; on a version conflict the whole cycle re-runs,
    /// at most `1 + max_conflict_retries` times in total.
    pub async fn execute(
        &self,
        account_id: AccountId,
        trade: TradeRequest,
    ) -> Result<TradeReceipt, EngineError> {
        let max_attempts = self.config.max_conflict_retries.saturating_add(1);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let Versioned { value: state, version } = self.load(account_id).await?;

            let outcome = match execute_trade(&state, &trade) {
                Ok(outcome) => outcome,
                Err(rejection) => {
                    tracing::debug!(account_id = %account_id, symbol = %trade.symbol, %rejection, "trade rejected");
                    return Err(rejection.into());
                }
            };

            let transaction = Transaction {
                id: Uuid::new_v4(),
                account_id,
                symbol: trade.symbol.clone(),
                side: trade.side,
                quantity: trade.quantity,
                price_micros: trade.price_micros,
                total_value_micros: outcome.total_value_micros,
                executed_at: Utc::now(),
            };

            match self
                .store
                .save(account_id, &outcome.state, version, &transaction)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        account_id = %account_id,
                        symbol = %trade.symbol,
                        side = %trade.side,
                        quantity = trade.quantity,
                        total_value_micros = outcome.total_value_micros,
                        "trade executed"
                    );
                    return Ok(TradeReceipt {
                        state: outcome.state,
                        transaction,
                        realized_pnl_micros: outcome.realized_pnl_micros,
                    });
                }
                Err(StoreError::Conflict) => {
                    if attempts >= max_attempts {
                        tracing::warn!(account_id = %account_id, attempts, "giving up after repeated save conflicts");
                        return Err(EngineError::Conflict { attempts });
                    }
                    tracing::debug!(account_id = %account_id, attempts, "save conflict; retrying");
                }
                Err(StoreError::NotFound) => return Err(EngineError::AccountNotFound(account_id)),
                Err(StoreError::Unavailable(err)) => return Err(EngineError::Storage(err)),
            }
        }
    }

    /// Market value and unrealized PnL for every held position.
    ///
    /// Read-only; a symbol the oracle cannot price is reported as
    /// unpriced, not dropped and not zeroed.
    pub async fn valuate(&self, account_id: AccountId) -> Result<AccountValuation, EngineError> {
        let Versioned { value: state, .. } = self.load(account_id).await?;

        let symbols: Vec<String> = state.holdings.keys().cloned().collect();
        let marks = collect_marks(self.quotes.as_ref(), &symbols).await;
        let valuation = value_positions(&state.holdings, &marks);

        Ok(AccountValuation {
            account_id,
            cash_micros: state.account.cash_micros,
            valuation,
        })
    }

    /// Transaction history, most recent first. `limit` defaults from
    /// config.
    pub async fn history(
        &self,
        account_id: AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, EngineError> {
        // Surface AccountNotFound rather than an empty page for a bogus id.
        self.load(account_id).await?;

        let query = HistoryQuery::newest_first(limit.unwrap_or(self.config.history_default_limit));
        self.log
            .query(account_id, query)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => EngineError::AccountNotFound(account_id),
                StoreError::Conflict => {
                    EngineError::Storage(anyhow::anyhow!("unexpected conflict on history read"))
                }
                StoreError::Unavailable(e) => EngineError::Storage(e),
            })
    }

    async fn load(&self, account_id: AccountId) -> Result<Versioned<AccountState>, EngineError> {
        self.store.load(account_id).await.map_err(|err| match err {
            StoreError::NotFound => EngineError::AccountNotFound(account_id),
            StoreError::Conflict => {
                EngineError::Storage(anyhow::anyhow!("unexpected conflict on load"))
            }
            StoreError::Unavailable(e) => EngineError::Storage(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_converts_into_engine_error() {
        let err: EngineError = Rejection::InvalidSymbol.into();
        assert!(matches!(err, EngineError::Rejected(Rejection::InvalidSymbol)));
    }

    #[test]
    fn display_carries_offending_values() {
        let err = EngineError::Rejected(Rejection::InsufficientFunds {
            required_micros: 1_250 * MICROS_SCALE,
            available_micros: 800 * MICROS_SCALE,
        });
        let msg = err.to_string();
        assert!(msg.contains("1250.000000"), "{msg}");
        assert!(msg.contains("800.000000"), "{msg}");
    }

    #[test]
    fn conflict_display_mentions_attempts() {
        let err = EngineError::Conflict { attempts: 4 };
        assert!(err.to_string().contains('4'));
    }
}
