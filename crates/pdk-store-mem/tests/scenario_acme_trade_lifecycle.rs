//! Scenario: full buy/buy/sell lifecycle against the in-memory store.
//!
//! Covers cash conservation at the quoted price, volume-weighted average
//! cost, zero-quantity pruning, realized PnL, and history ordering.

use std::sync::Arc;

use pdk_config::LedgerConfig;
use pdk_engine::{EngineError, LedgerEngine};
use pdk_ledger::{Rejection, MICROS_SCALE};
use pdk_md::StaticQuoteProvider;
use pdk_schemas::{TradeRequest, TradeSide};
use pdk_store_mem::MemLedgerStore;
use uuid::Uuid;

const M: i64 = MICROS_SCALE;

fn engine_with_store(starting_cash_units: i64) -> (LedgerEngine, Arc<MemLedgerStore>) {
    let store = Arc::new(MemLedgerStore::new());
    let engine = LedgerEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(StaticQuoteProvider::new()),
        LedgerConfig {
            starting_cash_units,
            ..LedgerConfig::default()
        },
    );
    (engine, store)
}

fn trade(symbol: &str, side: TradeSide, quantity: i64, price_units: i64) -> TradeRequest {
    TradeRequest {
        symbol: symbol.to_string(),
        side,
        quantity,
        price_micros: price_units * M,
    }
}

#[tokio::test]
async fn acme_lifecycle_executes_and_records_history() {
    let (engine, store) = engine_with_store(100_000);
    let account_id = Uuid::new_v4();

    let opened = engine.open_account(account_id).await.unwrap();
    assert_eq!(opened.account.cash_micros, 100_000 * M);

    // Buy 10 @ 50 -> cash 99_500, ACME {10, 50}
    let r = engine
        .execute(account_id, trade("ACME", TradeSide::Buy, 10, 50))
        .await
        .unwrap();
    assert_eq!(r.state.account.cash_micros, 99_500 * M);
    assert_eq!(r.transaction.total_value_micros, 500 * M);
    assert_eq!(r.realized_pnl_micros, None);

    // Buy 5 @ 60 -> ACME {15, 53.333333}, cash 99_200
    let r = engine
        .execute(account_id, trade("ACME", TradeSide::Buy, 5, 60))
        .await
        .unwrap();
    let h = r.state.holdings.get("ACME").unwrap();
    assert_eq!(h.quantity, 15);
    assert_eq!(h.avg_cost_micros, 53_333_333);
    assert_eq!(r.state.account.cash_micros, 99_200 * M);

    // Sell 15 @ 70 -> holding pruned, cash 100_250, realized ~ 250.000005
    let r = engine
        .execute(account_id, trade("ACME", TradeSide::Sell, 15, 70))
        .await
        .unwrap();
    assert!(r.state.holdings.is_empty());
    assert_eq!(r.state.account.cash_micros, 100_250 * M);
    assert_eq!(r.realized_pnl_micros, Some(250_000_005));

    // One extra sell: rejected, no fourth transaction.
    let err = engine
        .execute(account_id, trade("ACME", TradeSide::Sell, 1, 70))
        .await;
    assert!(matches!(
        err,
        Err(EngineError::Rejected(Rejection::InsufficientShares { .. }))
    ));
    assert_eq!(store.transaction_count(account_id), 3);

    // History: newest first, exactly the three executed trades.
    let history = engine.history(account_id, None).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].side, TradeSide::Sell);
    assert_eq!(history[0].quantity, 15);
    assert_eq!(history[1].quantity, 5);
    assert_eq!(history[2].quantity, 10);
    assert!(history.iter().all(|t| t.symbol == "ACME"));

    // Limit truncates from the newest end.
    let page = engine.history(account_id, Some(1)).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].quantity, 15);
}

#[tokio::test]
async fn buy_then_equal_sell_at_same_price_conserves_cash_exactly() {
    let (engine, _store) = engine_with_store(100_000);
    let account_id = Uuid::new_v4();
    engine.open_account(account_id).await.unwrap();

    engine
        .execute(account_id, trade("TQQQ", TradeSide::Buy, 37, 61))
        .await
        .unwrap();
    let r = engine
        .execute(account_id, trade("TQQQ", TradeSide::Sell, 37, 61))
        .await
        .unwrap();
    assert_eq!(r.state.account.cash_micros, 100_000 * M);
    assert_eq!(r.realized_pnl_micros, Some(0));
}

#[tokio::test]
async fn open_account_with_oversized_starting_cash_is_a_config_error() {
    // i64::MAX units cannot be represented in micros; opening must fail
    // loudly instead of clamping the balance.
    let (engine, store) = engine_with_store(i64::MAX);
    let account_id = Uuid::new_v4();
    assert!(matches!(
        engine.open_account(account_id).await,
        Err(EngineError::Config { .. })
    ));
    assert_eq!(store.version(account_id), None);
}

#[tokio::test]
async fn open_account_twice_is_account_exists() {
    let (engine, _store) = engine_with_store(100_000);
    let account_id = Uuid::new_v4();
    engine.open_account(account_id).await.unwrap();
    assert!(matches!(
        engine.open_account(account_id).await,
        Err(EngineError::AccountExists(id)) if id == account_id
    ));
}

#[tokio::test]
async fn unknown_account_is_not_found_everywhere() {
    let (engine, _store) = engine_with_store(100_000);
    let ghost = Uuid::new_v4();

    assert!(matches!(
        engine.execute(ghost, trade("ACME", TradeSide::Buy, 1, 1)).await,
        Err(EngineError::AccountNotFound(_))
    ));
    assert!(matches!(
        engine.valuate(ghost).await,
        Err(EngineError::AccountNotFound(_))
    ));
    assert!(matches!(
        engine.history(ghost, None).await,
        Err(EngineError::AccountNotFound(_))
    ));
}
