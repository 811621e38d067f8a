//! pdk-schemas
//!
//! Shared data model for the simulated-trading ledger:
//! - `Account` / `Holding` / `AccountState` — the per-user consistency unit
//! - `Transaction` — the immutable trade record
//! - `TradeSide` / `TradeRequest` — parsed trade instructions
//!
//! All monetary fields are `i64` integer micros (1 unit = 1_000_000 micros);
//! the arithmetic lives in `pdk-ledger`, this crate only carries the shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one simulated account (1:1 with a user).
pub type AccountId = Uuid;

/// A user's cash balance. Mutated only by the ledger engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Cash in micros. `>= 0` after every committed operation.
    pub cash_micros: i64,
}

/// A nonzero position in one symbol.
///
/// Quantity is always `> 0` — a holding that reaches zero is removed from
/// the collection, never stored as a zero row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub quantity: i64,
    /// Volume-weighted average purchase price in micros. Sells never change it.
    pub avg_cost_micros: i64,
}

/// The `{Account, holdings}` pair the store loads and saves as one unit.
///
/// `BTreeMap` keyed by symbol: presence means quantity > 0, absence means no
/// position. Iteration order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub account: Account,
    pub holdings: BTreeMap<String, Holding>,
}

impl AccountState {
    pub fn new(id: AccountId, cash_micros: i64) -> Self {
        Self {
            account: Account { id, cash_micros },
            holdings: BTreeMap::new(),
        }
    }

    /// Quantity held for a symbol (0 if not held).
    pub fn quantity(&self, symbol: &str) -> i64 {
        self.holdings.get(symbol).map(|h| h.quantity).unwrap_or(0)
    }
}

/// BUY or SELL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    /// Parse the wire action string. Anything but exactly "buy" / "sell"
    /// is an error the caller maps to an InvalidAction rejection.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated-shape (not yet validated-content) trade instruction.
///
/// The price is caller-supplied — a simulated fill at the quoted price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: i64,
    pub price_micros: i64,
}

/// One executed trade. Immutable once created; append-only storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: AccountId,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: i64,
    pub price_micros: i64,
    /// `price * quantity` in micros.
    pub total_value_micros: i64,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_side_parse_exact_strings_only() {
        assert_eq!(TradeSide::parse("buy").unwrap(), TradeSide::Buy);
        assert_eq!(TradeSide::parse("sell").unwrap(), TradeSide::Sell);
        assert_eq!(TradeSide::parse("BUY"), Err("BUY".to_string()));
        assert_eq!(TradeSide::parse("hold"), Err("hold".to_string()));
        assert_eq!(TradeSide::parse(""), Err("".to_string()));
    }

    #[test]
    fn trade_side_serde_is_lowercase() {
        let json = serde_json::to_string(&TradeSide::Sell).unwrap();
        assert_eq!(json, "\"sell\"");
        let back: TradeSide = serde_json::from_str("\"buy\"").unwrap();
        assert_eq!(back, TradeSide::Buy);
    }

    #[test]
    fn account_state_quantity_zero_for_absent_symbol() {
        let state = AccountState::new(Uuid::new_v4(), 1_000_000);
        assert_eq!(state.quantity("ACME"), 0);
        assert!(state.holdings.is_empty());
    }
}
