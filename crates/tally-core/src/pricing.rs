//! # Pricing Engine
//!
//! Derives order totals from line items. Pure and deterministic.
//!
//! ## Calculation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each line (full precision, no rounding yet):                       │
//! │      subtotal += qty × unit_price                       (cents, exact)  │
//! │      tax      += qty × unit_price × rate                (1/10000 cent)  │
//! │      deposit  += qty × deposit                          (cents, exact)  │
//! │      discount += qty × per-unit discount                (cents, exact)  │
//! │                                                                         │
//! │  once, at order level:                                                  │
//! │      tax      = round_half_away_from_zero(tax)                          │
//! │      discount = order discount + line discounts                         │
//! │      total    = max(0, subtotal + tax + deposit − discount)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The total is computed from the already rounded figures, so
//! `total == max(0, subtotal + tax + deposit - discount)` holds exactly on
//! the values that are stored and shown.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{Money, PreciseMoney};
use crate::types::LineItem;

/// The computed money figures of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Totals {
    /// Σ quantity × unit price (net).
    pub subtotal: Money,
    /// Σ line tax, rounded once.
    pub tax: Money,
    /// Σ quantity × deposit.
    pub deposit: Money,
    /// Order-level discount plus all per-unit line discounts.
    pub discount: Money,
    /// Grand total, never negative.
    pub total: Money,
}

impl Totals {
    /// Whether the grand-total invariant holds for these figures.
    pub fn is_consistent(&self) -> bool {
        self.total == (self.subtotal + self.tax + self.deposit - self.discount).clamp_non_negative()
    }
}

/// Computes the totals of a set of line items and an order-level discount.
///
/// A discount larger than everything else clamps the total at zero; the
/// discount itself is reported as given. Sums saturate at the `Money`
/// bounds, so no discount can wrap the total around.
///
/// ## Example
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::pricing::compute_totals;
///
/// let totals = compute_totals(&[], Money::from_cents(500));
/// assert!(totals.total.is_zero());
/// assert_eq!(totals.discount.cents(), 500);
/// ```
pub fn compute_totals(items: &[LineItem], order_discount: Money) -> Totals {
    let mut subtotal = Money::zero();
    let mut tax = PreciseMoney::zero();
    let mut deposit = Money::zero();
    let mut line_discount = Money::zero();

    for item in items {
        subtotal += item.subtotal();
        tax += item.precise_tax();
        deposit += item.deposit_total();
        line_discount += item.discount_total();
    }

    let tax = tax.round_to_money();
    let discount = order_discount + line_discount;
    let total = (subtotal + tax + deposit - discount).clamp_non_negative();

    Totals {
        subtotal,
        tax,
        deposit,
        discount,
        total,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
