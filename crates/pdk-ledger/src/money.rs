//! Fixed-point money representation.
//!
//! All monetary amounts in this system use a 1e-6 (micros) fixed-point
//! representation stored as `i64`. `Micros` wraps the raw `i64` so the
//! type system prevents mixing money with unrelated integers (share
//! quantities, IDs). Share counts stay plain `i64` and are never
//! implicitly convertible.
//!
//! `f64` conversions happen **only** at the wire boundary:
//! [`price_to_micros`] when ingesting a caller- or vendor-supplied
//! decimal price, [`micros_to_price`] when serializing one back out.
//! [`price_to_micros`] rejects NaN, infinities, and out-of-range values
//! in all build profiles.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Scale factor: 1 unit = 1_000_000 micros (6 decimal places).
pub const MICROS_SCALE: i64 = 1_000_000;

/// A fixed-point monetary amount at 1e-6 scale.
///
/// There is intentionally no `From<i64>` impl — construction goes
/// through [`Micros::new`] so callers are deliberate about when a raw
/// integer represents money.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Micros(i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Construct from a whole-unit amount (e.g. dollars).
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Micros(units * MICROS_SCALE)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    /// Multiply a per-unit price by an integer share quantity.
    ///
    /// Returns `None` on `i64` overflow; callers must handle it
    /// explicitly — overflow in a trade value is a rejection, not a
    /// routine saturation.
    #[inline]
    pub fn checked_mul_qty(self, qty: i64) -> Option<Micros> {
        self.0.checked_mul(qty).map(Micros)
    }

    pub fn checked_add(self, rhs: Micros) -> Option<Micros> {
        self.0.checked_add(rhs.0).map(Micros)
    }
}

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Micros {
    #[inline]
    fn sub_assign(&mut self, rhs: Micros) {
        self.0 -= rhs.0;
    }
}

impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 / MICROS_SCALE;
        let frac = (self.0 % MICROS_SCALE).abs();
        // When |value| < 1 unit and negative, integer division truncates
        // to 0 and loses the sign. Emit "-0" explicitly.
        if self.0 < 0 && units == 0 {
            write!(f, "-{units}.{frac:06}")
        } else {
            write!(f, "{units}.{frac:06}")
        }
    }
}

// ---------------------------------------------------------------------------
// Wire-boundary conversions
// ---------------------------------------------------------------------------

/// Errors from [`price_to_micros`] when the input is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceError {
    /// Input was NaN or infinite.
    NotFinite,
    /// Input would overflow `i64` after scaling.
    OutOfRange,
}

impl std::fmt::Display for PriceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceError::NotFinite => write!(f, "price_to_micros: non-finite input (NaN or Inf)"),
            PriceError::OutOfRange => {
                write!(f, "price_to_micros: price out of i64 range after scaling")
            }
        }
    }
}

impl std::error::Error for PriceError {}

/// Convert an `f64` decimal price into integer micros, rounding to the
/// nearest micro. Only call when ingesting external prices.
pub fn price_to_micros(price: f64) -> Result<i64, PriceError> {
    if !price.is_finite() {
        return Err(PriceError::NotFinite);
    }
    let scaled = price * MICROS_SCALE as f64;
    // f64→i64 casts saturate in Rust; we must reject instead.
    if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(PriceError::OutOfRange);
    }
    Ok(scaled.round() as i64)
}

/// Convert integer micros to `f64` for external serialization only.
pub fn micros_to_price(micros: i64) -> f64 {
    micros as f64 / MICROS_SCALE as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
