//! # Money Module
//!
//! Integer money for every amount in Tally POS, plus a high-precision
//! accumulator for tax.
//!
//! ## Two Precisions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Money(i64)          1 unit = 1 cent        stored, displayed, paid    │
//! │  PreciseMoney(i128)  1 unit = 1/10000 cent  tax while summing lines    │
//! │                                                                         │
//! │  3.50 × 2 @ 19%:                                                        │
//! │    exact tax  = 350 × 2 × 1900     = 1_330_000 units (1.33 exactly)    │
//! │    rounded    = round(1_330_000)   = 133 cents                          │
//! │                                                                         │
//! │  Lines are summed as PreciseMoney, the order total is rounded ONCE.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let price: Money = "3.50".parse().unwrap();
//! assert_eq!(price.cents(), 350);
//! assert_eq!((price * 2).to_string(), "7.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: refunds and intermediate differences can be negative
/// - **Saturating arithmetic**: discounts are unbounded input, so sums and
///   products clamp at `i64::MIN`/`i64::MAX` instead of wrapping
/// - **No float constructor**: amounts enter the system as cents or as
///   decimal strings parsed by [`FromStr`]
/// - **Display without symbol**: `"8.33"`; the currency symbol belongs to
///   the store configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let price = Money::from_cents(350);
    /// assert_eq!(price.to_string(), "3.50");
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// `from_major_minor(-5, 50)` is -5.50: only the major part carries the sign.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (euros, dollars) portion, truncated toward zero.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.saturating_abs())
    }

    /// Clamps negative values to zero.
    ///
    /// Used for the grand total and for change: neither is ever negative.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            Money(self.0)
        }
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Exact tax on this amount, not yet rounded.
    ///
    /// `cents × bps` is the tax in 1/10000 cent, which is exactly the
    /// [`PreciseMoney`] unit. No precision is lost here.
    #[inline]
    pub fn precise_tax(&self, rate: TaxRate) -> PreciseMoney {
        PreciseMoney::from_units(self.0 as i128 * rate.bps() as i128)
    }

    /// Tax on this amount rounded half away from zero.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::TaxRate;
    ///
    /// // 10.00 × 8.25% = 0.825 → 0.83
    /// let tax = Money::from_cents(1000).calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.precise_tax(rate).round_to_money()
    }

    /// Formats the amount with a currency symbol, e.g. `"8.33 €"` or `"€8.33"`.
    pub fn format_with_symbol(&self, symbol: &str, symbol_after: bool) -> String {
        if symbol_after {
            format!("{} {}", self, symbol)
        } else if self.0 < 0 {
            format!("-{}{}", symbol, self.abs())
        } else {
            format!("{}{}", symbol, self)
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

/// Parses a decimal amount such as `"3.50"`, `"-1.5"`, `"10"` or `"2,99"`.
///
/// At most two fractional digits are accepted; anything finer than a cent
/// is rejected rather than silently rounded.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (major, minor) = match digits.split_once(|c| c == '.' || c == ',') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major.is_empty() && minor.is_empty() {
            return Err(invalid("expected a decimal number"));
        }
        if !major.chars().all(|c| c.is_ascii_digit()) || !minor.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a decimal number"));
        }
        if minor.len() > 2 {
            return Err(invalid("at most two decimal places are allowed"));
        }

        let major_value: i64 = if major.is_empty() {
            0
        } else {
            major.parse().map_err(|_| invalid("amount is too large"))?
        };
        let minor_value: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|_| invalid("expected a decimal number"))? * 10,
            _ => minor.parse().map_err(|_| invalid("expected a decimal number"))?,
        };

        let cents = major_value
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor_value))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(self.0.saturating_neg())
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// PreciseMoney
// =============================================================================

/// Units of [`PreciseMoney`] per cent.
pub const PRECISE_UNITS_PER_CENT: i128 = 10_000;

/// High-precision money in 1/10000 of a cent.
///
/// Only the pricing engine accumulates in this type. It is never stored and
/// never shown; [`PreciseMoney::round_to_money`] is the single exit point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PreciseMoney(i128);

impl PreciseMoney {
    #[inline]
    pub const fn zero() -> Self {
        PreciseMoney(0)
    }

    #[inline]
    pub const fn from_units(units: i128) -> Self {
        PreciseMoney(units)
    }

    #[inline]
    pub const fn from_money(money: Money) -> Self {
        PreciseMoney(money.cents() as i128 * PRECISE_UNITS_PER_CENT)
    }

    #[inline]
    pub const fn units(&self) -> i128 {
        self.0
    }

    /// Rounds to whole cents, half away from zero.
    ///
    /// ```text
    ///   0.5 cent  →  1 cent        -0.5 cent  →  -1 cent
    ///   0.4999    →  0             -0.4999    →   0
    /// ```
    pub fn round_to_money(&self) -> Money {
        let half = PRECISE_UNITS_PER_CENT / 2;
        let rounded = if self.0 >= 0 {
            self.0.saturating_add(half) / PRECISE_UNITS_PER_CENT
        } else {
            self.0.saturating_sub(half) / PRECISE_UNITS_PER_CENT
        };
        Money::from_cents(rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl Add for PreciseMoney {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        PreciseMoney(self.0.saturating_add(other.0))
    }
}

impl AddAssign for PreciseMoney {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Mul<i64> for PreciseMoney {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        PreciseMoney(self.0.saturating_mul(qty as i128))
    }
}

impl Sum for PreciseMoney {
    fn sum<I: Iterator<Item = PreciseMoney>>(iter: I) -> Self {
        iter.fold(PreciseMoney::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
