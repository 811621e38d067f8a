//! Trade application — the single authority for cash/holdings mutations.
//!
//! # Shape
//! [`execute_trade`] is functional: it takes the current
//! [`AccountState`] by reference and returns a **new** state (plus the
//! trade's total value and realized PnL) or a typed [`Rejection`]. The
//! input is never mutated, so a rejected trade structurally cannot leave
//! partial effects.
//!
//! # Accounting rules
//! - Buy: `total = price * qty`; rejected if `total > cash`; otherwise
//!   the holding's average cost becomes the volume-weighted average of
//!   the existing lot and the new purchase, and cash decreases by
//!   `total`.
//! - Sell: rejected unless the held quantity covers the request; cash
//!   increases by `price * qty` exactly (average cost plays no part in
//!   the cash movement, so buy-then-sell at one price conserves cash
//!   bit-for-bit); average cost is unchanged by a sell; a position that
//!   reaches zero is removed from the map.
//! - Realized PnL on a sell is `(price - avg_cost) * qty`, returned to
//!   the caller; it is derivable from stored data and not persisted.
//!
//! # Determinism
//! Pure integer arithmetic, i128 intermediates, round-to-nearest on the
//! average-cost division. No IO, no time, no randomness.

use pdk_schemas::{AccountState, Holding, TradeRequest, TradeSide};

use crate::money::Micros;

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Every way a trade instruction can be refused without touching state.
///
/// Input errors and business-rule rejections are both routine outcomes —
/// callers branch on them, so each carries the offending values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Quantity must be a positive integer.
    InvalidQuantity { quantity: i64 },
    /// Price must be strictly positive (finiteness is enforced at the
    /// wire boundary by `price_to_micros`).
    InvalidPrice { price_micros: i64 },
    /// Action string was not exactly "buy" or "sell".
    InvalidAction { action: String },
    /// Symbol must be non-empty.
    InvalidSymbol,
    /// `price * quantity` does not fit in i64 micros.
    ValueOverflow { quantity: i64, price_micros: i64 },
    /// Buy rejected: total cost exceeds the cash balance.
    InsufficientFunds {
        required_micros: i64,
        available_micros: i64,
    },
    /// Sell rejected: not enough shares held.
    InsufficientShares {
        symbol: String,
        requested: i64,
        held: i64,
    },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuantity { quantity } => {
                write!(f, "invalid quantity: must be a positive integer, got {quantity}")
            }
            Self::InvalidPrice { price_micros } => {
                write!(f, "invalid price: must be > 0, got {}", Micros::new(*price_micros))
            }
            Self::InvalidAction { action } => {
                write!(f, "invalid action: expected buy or sell, got {action:?}")
            }
            Self::InvalidSymbol => write!(f, "invalid symbol: must not be empty"),
            Self::ValueOverflow {
                quantity,
                price_micros,
            } => write!(
                f,
                "trade value overflow: {quantity} x {}",
                Micros::new(*price_micros)
            ),
            Self::InsufficientFunds {
                required_micros,
                available_micros,
            } => write!(
                f,
                "insufficient funds: need {}, have {}",
                Micros::new(*required_micros),
                Micros::new(*available_micros)
            ),
            Self::InsufficientShares {
                symbol,
                requested,
                held,
            } => write!(
                f,
                "insufficient shares: {symbol} requested {requested}, held {held}"
            ),
        }
    }
}

impl std::error::Error for Rejection {}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of a successfully applied trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOutcome {
    /// The new account state; the caller's input state is untouched.
    pub state: AccountState,
    /// `price * quantity` in micros.
    pub total_value_micros: i64,
    /// `(price - avg_cost) * quantity` for sells; `None` for buys.
    pub realized_pnl_micros: Option<i64>,
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Map a wire-level action string to a trade side.
///
/// Anything that is not exactly `buy` or `sell` is rejected; callers
/// decoding untyped requests go through here before building a
/// [`TradeRequest`].
pub fn parse_action(action: &str) -> Result<TradeSide, Rejection> {
    TradeSide::parse(action).map_err(|action| Rejection::InvalidAction { action })
}

/// Validate and apply one trade instruction against an account state.
///
/// # Errors
/// Returns a [`Rejection`]; the input state is never mutated.
pub fn execute_trade(state: &AccountState, trade: &TradeRequest) -> Result<TradeOutcome, Rejection> {
    if trade.symbol.trim().is_empty() {
        return Err(Rejection::InvalidSymbol);
    }
    if trade.quantity <= 0 {
        return Err(Rejection::InvalidQuantity {
            quantity: trade.quantity,
        });
    }
    if trade.price_micros <= 0 {
        return Err(Rejection::InvalidPrice {
            price_micros: trade.price_micros,
        });
    }

    let total = Micros::new(trade.price_micros)
        .checked_mul_qty(trade.quantity)
        .ok_or(Rejection::ValueOverflow {
            quantity: trade.quantity,
            price_micros: trade.price_micros,
        })?;

    match trade.side {
        TradeSide::Buy => apply_buy(state, trade, total),
        TradeSide::Sell => apply_sell(state, trade, total),
    }
}

fn apply_buy(
    state: &AccountState,
    trade: &TradeRequest,
    total: Micros,
) -> Result<TradeOutcome, Rejection> {
    let cash = Micros::new(state.account.cash_micros);
    if total > cash {
        return Err(Rejection::InsufficientFunds {
            required_micros: total.raw(),
            available_micros: cash.raw(),
        });
    }

    let existing = state
        .holdings
        .get(&trade.symbol)
        .cloned()
        .unwrap_or(Holding {
            quantity: 0,
            avg_cost_micros: 0,
        });

    let new_quantity = existing
        .quantity
        .checked_add(trade.quantity)
        .ok_or(Rejection::ValueOverflow {
            quantity: trade.quantity,
            price_micros: trade.price_micros,
        })?;

    // Volume-weighted average cost, i128 intermediate, round to nearest.
    let cost_basis = (existing.quantity as i128) * (existing.avg_cost_micros as i128)
        + (total.raw() as i128);
    let new_avg = div_round_nearest(cost_basis, new_quantity as i128);

    let mut next = state.clone();
    next.holdings.insert(
        trade.symbol.clone(),
        Holding {
            quantity: new_quantity,
            avg_cost_micros: new_avg,
        },
    );
    next.account.cash_micros = (cash - total).raw();

    Ok(TradeOutcome {
        state: next,
        total_value_micros: total.raw(),
        realized_pnl_micros: None,
    })
}

fn apply_sell(
    state: &AccountState,
    trade: &TradeRequest,
    total: Micros,
) -> Result<TradeOutcome, Rejection> {
    let held = state.holdings.get(&trade.symbol);
    let existing = match held {
        Some(h) if h.quantity >= trade.quantity => h.clone(),
        _ => {
            return Err(Rejection::InsufficientShares {
                symbol: trade.symbol.clone(),
                requested: trade.quantity,
                held: held.map(|h| h.quantity).unwrap_or(0),
            })
        }
    };

    let realized = (trade.price_micros as i128 - existing.avg_cost_micros as i128)
        * (trade.quantity as i128);

    let mut next = state.clone();
    let remaining = existing.quantity - trade.quantity;
    if remaining == 0 {
        // Never retain a zero-quantity row.
        next.holdings.remove(&trade.symbol);
    } else {
        next.holdings.insert(
            trade.symbol.clone(),
            Holding {
                quantity: remaining,
                avg_cost_micros: existing.avg_cost_micros,
            },
        );
    }
    next.account.cash_micros = Micros::new(state.account.cash_micros)
        .checked_add(total)
        .ok_or(Rejection::ValueOverflow {
            quantity: trade.quantity,
            price_micros: trade.price_micros,
        })?
        .raw();

    Ok(TradeOutcome {
        state: next,
        total_value_micros: total.raw(),
        realized_pnl_micros: Some(i128_to_i64_clamp(realized)),
    })
}

/// n / d rounded to the nearest integer, ties away from zero.
/// Both operands are positive on every call path here.
fn div_round_nearest(n: i128, d: i128) -> i64 {
    debug_assert!(d > 0);
    i128_to_i64_clamp((n + d / 2) / d)
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
