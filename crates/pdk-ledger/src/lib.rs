//! pdk-ledger
//!
//! The portfolio ledger core:
//! - average-cost accounting for simulated buy/sell fills
//! - typed rejections (input errors and business-rule rejections)
//! - read-side position valuation against caller-supplied marks
//! - integer-micros money representation, `f64` only at the wire boundary
//!
//! Pure deterministic logic — no IO, no time, no storage wiring. The
//! engine crate (`pdk-engine`) owns load/save orchestration; everything
//! here operates on an [`AccountState`](pdk_schemas::AccountState) value
//! and returns a new one.

mod engine;
mod money;

pub mod valuation;

pub use engine::{execute_trade, parse_action, Rejection, TradeOutcome};
pub use money::{micros_to_price, price_to_micros, Micros, PriceError, MICROS_SCALE};
pub use valuation::{
    value_positions, AggregateValuation, MarkMap, PortfolioValuation, PositionValuation,
};

/// Helper to build a [`MarkMap`] with minimal boilerplate.
pub fn marks<I, S>(items: I) -> MarkMap
where
    I: IntoIterator<Item = (S, i64)>,
    S: Into<String>,
{
    let mut m = MarkMap::new();
    for (sym, px) in items {
        m.insert(sym.into(), px);
    }
    m
}
