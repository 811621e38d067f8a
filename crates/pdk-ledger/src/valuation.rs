//! Read-side position valuation.
//!
//! Pure computation over a holdings map and a caller-supplied mark map
//! (symbol -> price micros). A symbol the oracle could not price is
//! reported as **unpriced**, never as priced-at-zero, and never aborts
//! the rest of the computation; the aggregate covers priced positions
//! only and names the symbols it had to skip.

use std::collections::BTreeMap;

use pdk_schemas::Holding;

/// Canonical mark map type (symbol -> price micros).
pub type MarkMap = BTreeMap<String, i64>;

/// Valuation of a single priced position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionValue {
    /// `quantity * mark` in micros.
    pub market_value_micros: i64,
    /// `(mark - avg_cost) * quantity` in micros.
    pub unrealized_pnl_micros: i64,
    /// Unrealized PnL as a percentage of cost basis. Derived display
    /// metric; all accounting stays in integer micros.
    pub unrealized_pnl_pct: f64,
}

/// Per-symbol valuation row. `value` is `None` when no mark was available.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionValuation {
    pub symbol: String,
    pub quantity: i64,
    pub avg_cost_micros: i64,
    pub value: Option<PositionValue>,
}

/// Aggregate over the **priced** positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateValuation {
    pub total_market_value_micros: i64,
    pub total_unrealized_pnl_micros: i64,
    /// Symbols excluded from the totals because no mark was available.
    pub unpriced_symbols: Vec<String>,
}

/// Full portfolio valuation.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioValuation {
    /// One row per holding, in symbol order.
    pub positions: Vec<PositionValuation>,
    pub aggregate: AggregateValuation,
}

/// Value every holding against the supplied marks.
pub fn value_positions(holdings: &BTreeMap<String, Holding>, marks: &MarkMap) -> PortfolioValuation {
    let mut positions = Vec::with_capacity(holdings.len());
    let mut total_mv: i128 = 0;
    let mut total_upnl: i128 = 0;
    let mut unpriced: Vec<String> = Vec::new();

    // BTreeMap iteration: deterministic symbol order.
    for (symbol, holding) in holdings {
        let value = match marks.get(symbol) {
            Some(&mark) => {
                let mv = (holding.quantity as i128) * (mark as i128);
                let upnl =
                    (mark as i128 - holding.avg_cost_micros as i128) * (holding.quantity as i128);
                total_mv += mv;
                total_upnl += upnl;

                let cost_basis = (holding.quantity as i128) * (holding.avg_cost_micros as i128);
                let pct = if cost_basis == 0 {
                    0.0
                } else {
                    upnl as f64 / cost_basis as f64 * 100.0
                };

                Some(PositionValue {
                    market_value_micros: i128_to_i64_clamp(mv),
                    unrealized_pnl_micros: i128_to_i64_clamp(upnl),
                    unrealized_pnl_pct: pct,
                })
            }
            None => {
                unpriced.push(symbol.clone());
                None
            }
        };

        positions.push(PositionValuation {
            symbol: symbol.clone(),
            quantity: holding.quantity,
            avg_cost_micros: holding.avg_cost_micros,
            value,
        });
    }

    PortfolioValuation {
        positions,
        aggregate: AggregateValuation {
            total_market_value_micros: i128_to_i64_clamp(total_mv),
            total_unrealized_pnl_micros: i128_to_i64_clamp(total_upnl),
            unpriced_symbols: unpriced,
        },
    }
}

fn i128_to_i64_clamp(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}
