//! # Reporting Aggregator
//!
//! Read-only folds over orders. Nothing is cached; every report is
//! recomputed from the orders it is given, so the same set of orders
//! always produces the same report.
//!
//! ## Rules
//! - An order belongs to a range when `start <= created_at < end`
//! - Revenue and deposit only count `Paid` orders
//! - Test orders are skipped unless the range asks for them
//! - Deposit returns belong to a range by `returned_at`
//! - Days are UTC calendar days

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::order::Order;
use crate::types::{DepositReturn, OrderStatus, PaymentMethod, ProductCategory};
use crate::validation::ValidationResult;

// =============================================================================
// Range
// =============================================================================

/// A half-open time window `[start, end)` plus the test-order switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub include_test_orders: bool,
}

impl ReportRange {
    /// Creates a range; `end` before `start` is rejected, `end == start` is empty.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ValidationResult<Self> {
        if end < start {
            return Err(ValidationError::InvalidFormat {
                field: "end".to_string(),
                reason: "end must not be before start".to_string(),
            });
        }
        Ok(ReportRange {
            start,
            end,
            include_test_orders: false,
        })
    }

    /// Whole UTC days from `first` up to and including `last`.
    pub fn days(first: NaiveDate, last: NaiveDate) -> ValidationResult<Self> {
        let out_of_range = || ValidationError::InvalidFormat {
            field: "end".to_string(),
            reason: "date out of range".to_string(),
        };
        let midnight = |day: NaiveDate| day.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());

        let start = midnight(first).ok_or_else(out_of_range)?;
        let end = last.succ_opt().and_then(midnight).ok_or_else(out_of_range)?;
        Self::new(start, end)
    }

    pub fn with_test_orders(mut self, include: bool) -> Self {
        self.include_test_orders = include;
        self
    }

    pub fn contains(&self, order: &Order) -> bool {
        self.covers(order.created_at()) && (self.include_test_orders || !order.is_test_order())
    }

    /// Whether `at` falls inside `[start, end)`.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Revenue and order counts over a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RevenueSummary {
    /// Orders of any status created in the range.
    pub order_count: usize,
    pub paid_order_count: usize,
    pub cancelled_order_count: usize,
    /// Σ grand total of paid orders.
    pub revenue: Money,
    /// Σ deposit of paid orders.
    pub deposit_collected: Money,
    /// revenue / paid orders, rounded half up; zero when nothing was paid.
    pub average_order_value: Money,
}

/// Folds orders into a [`RevenueSummary`].
pub fn summarize(orders: &[Order], range: &ReportRange) -> RevenueSummary {
    let mut summary = RevenueSummary::default();

    for order in orders.iter().filter(|o| range.contains(o)) {
        summary.order_count += 1;
        match order.status() {
            OrderStatus::Paid => {
                summary.paid_order_count += 1;
                summary.revenue += order.totals().total;
                summary.deposit_collected += order.totals().deposit;
            }
            OrderStatus::Cancelled => summary.cancelled_order_count += 1,
            OrderStatus::Open | OrderStatus::PartiallyCancelled => {}
        }
    }

    summary.average_order_value = average(summary.revenue, summary.paid_order_count);
    summary
}

fn average(total: Money, count: usize) -> Money {
    if count == 0 {
        return Money::zero();
    }
    let count = count as i128;
    // Revenue is never negative, so adding half the divisor rounds half up.
    let cents = (total.cents() as i128 * 2 + count) / (count * 2);
    Money::from_cents(cents as i64)
}

// =============================================================================
// Daily Series
// =============================================================================

/// One day of the daily series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailyStats {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub order_count: usize,
    pub paid_order_count: usize,
    pub revenue: Money,
}

/// One entry per UTC day that has at least one order, sorted by date.
pub fn daily_series(orders: &[Order], range: &ReportRange) -> Vec<DailyStats> {
    let mut days: BTreeMap<NaiveDate, DailyStats> = BTreeMap::new();

    for order in orders.iter().filter(|o| range.contains(o)) {
        let date = order.created_at().date_naive();
        let day = days.entry(date).or_insert(DailyStats {
            date,
            order_count: 0,
            paid_order_count: 0,
            revenue: Money::zero(),
        });
        day.order_count += 1;
        if order.is_paid() {
            day.paid_order_count += 1;
            day.revenue += order.totals().total;
        }
    }

    days.into_values().collect()
}

// =============================================================================
// Payment Breakdown
// =============================================================================

/// Paid revenue for one payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentBreakdown {
    pub method: PaymentMethod,
    pub order_count: usize,
    pub revenue: Money,
}

/// Paid revenue grouped by payment method; methods with no orders are omitted.
pub fn payment_breakdown(orders: &[Order], range: &ReportRange) -> Vec<PaymentBreakdown> {
    let mut by_method: BTreeMap<PaymentMethod, PaymentBreakdown> = BTreeMap::new();

    for order in orders.iter().filter(|o| range.contains(o) && o.is_paid()) {
        let Some(method) = order.payment_method() else {
            continue;
        };
        let entry = by_method.entry(method).or_insert(PaymentBreakdown {
            method,
            order_count: 0,
            revenue: Money::zero(),
        });
        entry.order_count += 1;
        entry.revenue += order.totals().total;
    }

    by_method.into_values().collect()
}

// =============================================================================
// Deposit Statistics
// =============================================================================

/// Deposit movement on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailyDeposits {
    #[ts(as = "String")]
    pub date: NaiveDate,
    /// Σ deposit on paid orders created that day.
    pub collected: Money,
    /// Σ deposit paid out for returns booked that day.
    pub returned: Money,
    /// collected − returned; negative when more empties came back than went out.
    pub balance: Money,
}

/// Deposit movement for one product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryDeposits {
    pub category: ProductCategory,
    pub collected: Money,
    pub returned: Money,
    pub balance: Money,
}

/// Deposit collected on sales against deposit paid back on returns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DepositStatistics {
    pub collected: Money,
    pub returned: Money,
    /// Deposit still held: collected − returned.
    pub balance: Money,
    pub return_count: usize,
    /// Days with any deposit movement, sorted by date.
    pub daily: Vec<DailyDeposits>,
    /// Categories with any deposit movement, in category order.
    pub by_category: Vec<CategoryDeposits>,
    /// Mean collected deposit over the days that collected any.
    pub average_daily_collected: Money,
    /// The day that collected the most; the earliest one on a tie.
    #[ts(as = "Option<String>")]
    pub highest_day: Option<NaiveDate>,
}

/// Folds paid orders and deposit returns into [`DepositStatistics`].
///
/// `category_of` maps a product id to its catalog category. Line items only
/// carry the id, so the caller supplies the lookup; unknown ids count as
/// [`ProductCategory::Other`].
pub fn deposit_statistics<F>(
    orders: &[Order],
    returns: &[DepositReturn],
    range: &ReportRange,
    category_of: F,
) -> DepositStatistics
where
    F: Fn(&str) -> Option<ProductCategory>,
{
    let mut days: BTreeMap<NaiveDate, (Money, Money)> = BTreeMap::new();
    let mut categories: BTreeMap<ProductCategory, (Money, Money)> = BTreeMap::new();
    let mut stats = DepositStatistics::default();
    let category = |product_id: &str| category_of(product_id).unwrap_or(ProductCategory::Other);

    for order in orders.iter().filter(|o| range.contains(o) && o.is_paid()) {
        let date = order.created_at().date_naive();
        for line in order.items().iter().filter(|l| l.deposit_cents.is_some()) {
            let amount = line.deposit_total();
            stats.collected += amount;
            days.entry(date).or_default().0 += amount;
            categories.entry(category(&line.product_id)).or_default().0 += amount;
        }
    }

    for ret in returns.iter().filter(|r| range.covers(r.returned_at)) {
        let amount = ret.amount();
        stats.returned += amount;
        stats.return_count += 1;
        days.entry(ret.returned_at.date_naive()).or_default().1 += amount;
        categories.entry(category(&ret.product_id)).or_default().1 += amount;
    }

    stats.balance = stats.collected - stats.returned;

    let mut collecting_days = 0;
    let mut highest = Money::zero();
    for (&date, &(collected, returned)) in &days {
        if collected.is_positive() {
            collecting_days += 1;
            if collected > highest {
                highest = collected;
                stats.highest_day = Some(date);
            }
        }
        stats.daily.push(DailyDeposits {
            date,
            collected,
            returned,
            balance: collected - returned,
        });
    }
    let collected_on_days: Money = stats.daily.iter().map(|d| d.collected).sum();
    stats.average_daily_collected = average(collected_on_days, collecting_days);

    stats.by_category = categories
        .into_iter()
        .map(|(category, (collected, returned))| CategoryDeposits {
            category,
            collected,
            returned,
            balance: collected - returned,
        })
        .collect();

    stats
}

// =============================================================================
// Unit Tests
// =============================================================================
