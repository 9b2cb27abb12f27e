//! # Order Aggregate
//!
//! An order owns its line items and its order-level state. Every mutation
//! goes through a method here, and every method that touches line items or
//! discounts recomputes the totals through [`compute_totals`] before it
//! returns. Fields are private so that nothing can skip that step.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Open ──mark_paid()──────► Paid        (frozen)                        │
//! │     │                                                                   │
//! │     └──mark_cancelled()───► Cancelled   (frozen)                        │
//! │                                                                         │
//! │   PartiallyCancelled exists for stored data only; nothing here          │
//! │   produces it.                                                          │
//! │                                                                         │
//! │   Any mutation on a non-Open order → CoreError::InvalidState            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stock Bookkeeping
//! The aggregate never touches the catalog. Instead, [`Order::mark_paid`]
//! and [`Order::mark_cancelled`] return the [`StockAdjustment`]s the caller
//! must apply in the same transaction. Each line remembers how many units
//! were taken (`stock_applied`), so a restoration gives back exactly that
//! and never more.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::{compute_totals, Totals};
use crate::types::{LineItem, OrderStatus, PaymentMethod, Product, StockAdjustment};
use crate::validation::{validate_non_negative_amount, validate_quantity};
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_LINES};

// =============================================================================
// Order
// =============================================================================

/// An order and its line items.
///
/// Serializes with its totals; deserializes through [`PersistedOrder`], so
/// the totals are always recomputed rather than trusted.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct Order {
    id: String,
    order_number: String,
    /// Acting user that created the order (opaque id from the identity provider).
    created_by: i64,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
    status: OrderStatus,
    payment_method: Option<PaymentMethod>,
    items: Vec<LineItem>,
    /// Order-level discount as entered; `totals.discount` also includes line discounts.
    order_discount: Money,
    totals: Totals,
    paid_amount: Money,
    change_amount: Money,
    #[ts(as = "Option<String>")]
    completed_at: Option<DateTime<Utc>>,
    is_test_order: bool,
    cancel_reason: Option<String>,
    notes: Option<String>,
}

/// Everything needed to rebuild an [`Order`] from storage.
///
/// Totals are absent: they are recomputed on restore.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistedOrder {
    pub id: String,
    pub order_number: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub payment_method: Option<PaymentMethod>,
    pub items: Vec<LineItem>,
    pub order_discount: Money,
    pub paid_amount: Money,
    pub change_amount: Money,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_test_order: bool,
    pub cancel_reason: Option<String>,
    pub notes: Option<String>,
}

impl<'de> Deserialize<'de> for Order {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        PersistedOrder::deserialize(deserializer).map(Order::restore)
    }
}

impl Order {
    /// Creates a new empty `Open` order.
    pub fn new(
        id: impl Into<String>,
        order_number: impl Into<String>,
        created_by: i64,
        is_test_order: bool,
    ) -> Self {
        Order {
            id: id.into(),
            order_number: order_number.into(),
            created_by,
            created_at: Utc::now(),
            status: OrderStatus::Open,
            payment_method: None,
            items: Vec::new(),
            order_discount: Money::zero(),
            totals: Totals::default(),
            paid_amount: Money::zero(),
            change_amount: Money::zero(),
            completed_at: None,
            is_test_order,
            cancel_reason: None,
            notes: None,
        }
    }

    /// Rebuilds an order from storage. Totals are recomputed from the items.
    pub fn restore(persisted: PersistedOrder) -> Self {
        let mut order = Order {
            id: persisted.id,
            order_number: persisted.order_number,
            created_by: persisted.created_by,
            created_at: persisted.created_at,
            status: persisted.status,
            payment_method: persisted.payment_method,
            items: persisted.items,
            order_discount: persisted.order_discount,
            totals: Totals::default(),
            paid_amount: persisted.paid_amount,
            change_amount: persisted.change_amount,
            completed_at: persisted.completed_at,
            is_test_order: persisted.is_test_order,
            cancel_reason: persisted.cancel_reason,
            notes: persisted.notes,
        };
        order.recompute();
        order
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn created_by(&self) -> i64 {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn item(&self, line_item_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|i| i.id == line_item_id)
    }

    pub fn order_discount(&self) -> Money {
        self.order_discount
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    pub fn change_amount(&self) -> Money {
        self.change_amount
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_test_order(&self) -> bool {
        self.is_test_order
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Total minus paid; negative when change was given.
    pub fn remaining_amount(&self) -> Money {
        self.totals.total - self.paid_amount
    }

    pub fn can_be_modified(&self) -> bool {
        self.status == OrderStatus::Open
    }

    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == OrderStatus::Cancelled
    }

    /// Time between creation and payment/cancellation.
    pub fn processing_time(&self) -> Option<Duration> {
        self.completed_at.map(|done| done - self.created_at)
    }

    // -------------------------------------------------------------------------
    // Line item mutations
    // -------------------------------------------------------------------------

    /// Adds `quantity` units of `product`.
    ///
    /// If the product already has a line, that line's quantity grows and
    /// its original snapshot is kept. Otherwise a new line snapshots name,
    /// price, tax rate and deposit from the product as it is right now.
    ///
    /// Returns the id of the affected line.
    pub fn add_line_item(&mut self, product: &Product, quantity: i64) -> CoreResult<String> {
        self.ensure_open()?;

        if !product.is_active {
            return Err(CoreError::ProductUnavailable(product.id.clone()));
        }
        validate_quantity(quantity)?;

        let existing = self.items.iter().position(|i| i.product_id == product.id);
        let line_id = if let Some(index) = existing {
            let line = &mut self.items[index];
            let merged = line.quantity + quantity;
            if merged > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: merged,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            line.quantity = merged;
            line.id.clone()
        } else {
            if self.items.len() >= MAX_ORDER_LINES {
                return Err(CoreError::TooManyLines { max: MAX_ORDER_LINES });
            }
            let line = LineItem {
                id: Uuid::new_v4().to_string(),
                order_id: self.id.clone(),
                product_id: product.id.clone(),
                name_snapshot: product.name.clone(),
                quantity,
                unit_price_cents: product.price_cents,
                tax_rate_bps: product.tax_rate_bps,
                deposit_cents: product.deposit().map(|d| d.cents()),
                discount_cents: 0,
                stock_applied: 0,
                created_at: Utc::now(),
            };
            let id = line.id.clone();
            self.items.push(line);
            id
        };

        self.recompute();
        Ok(line_id)
    }

    /// Removes a line. A second call for the same id yields `LineItemNotFound`.
    pub fn remove_line_item(&mut self, line_item_id: &str) -> CoreResult<LineItem> {
        self.ensure_open()?;

        let position = self
            .items
            .iter()
            .position(|i| i.id == line_item_id)
            .ok_or_else(|| CoreError::LineItemNotFound(line_item_id.to_string()))?;
        let removed = self.items.remove(position);

        self.recompute();
        Ok(removed)
    }

    /// Sets a line's quantity. Zero or less removes the line.
    pub fn set_line_item_quantity(&mut self, line_item_id: &str, quantity: i64) -> CoreResult<()> {
        self.ensure_open()?;

        if quantity <= 0 {
            self.remove_line_item(line_item_id)?;
            return Ok(());
        }
        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }

        let line = self.line_mut(line_item_id)?;
        line.quantity = quantity;

        self.recompute();
        Ok(())
    }

    /// Sets the order-level discount. It may exceed the order value; the
    /// total then clamps at zero.
    pub fn apply_discount(&mut self, amount: Money) -> CoreResult<()> {
        self.ensure_open()?;
        validate_non_negative_amount("discount", amount.cents())?;

        self.order_discount = amount;
        self.recompute();
        Ok(())
    }

    /// Sets a per-unit discount on one line.
    pub fn apply_line_discount(&mut self, line_item_id: &str, per_unit: Money) -> CoreResult<()> {
        self.ensure_open()?;
        validate_non_negative_amount("discount", per_unit.cents())?;

        let line = self.line_mut(line_item_id)?;
        line.discount_cents = per_unit.cents();

        self.recompute();
        Ok(())
    }

    /// Replaces the free-text note. Blank text clears it.
    pub fn set_notes(&mut self, notes: Option<String>) -> CoreResult<()> {
        self.ensure_open()?;
        self.notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Records the payment and freezes the order.
    ///
    /// Whatever is paid is recorded; an amount below the total is accepted.
    /// Change is `max(paid - total, 0)`.
    ///
    /// Returns one negative adjustment per line: the stock to take out.
    pub fn mark_paid(&mut self, method: PaymentMethod, paid: Money) -> CoreResult<Vec<StockAdjustment>> {
        self.ensure_open()?;
        validate_non_negative_amount("paid_amount", paid.cents())?;

        self.payment_method = Some(method);
        self.paid_amount = paid;
        self.change_amount = (paid - self.totals.total).clamp_non_negative();
        self.status = OrderStatus::Paid;
        self.completed_at = Some(Utc::now());

        let adjustments = self
            .items
            .iter_mut()
            .map(|line| {
                line.stock_applied = line.quantity;
                StockAdjustment {
                    product_id: line.product_id.clone(),
                    delta: -line.quantity,
                }
            })
            .collect();

        Ok(adjustments)
    }

    /// Cancels the order and freezes it.
    ///
    /// Only `Open` orders can be cancelled; a paid order stays paid.
    /// Returns the stock to give back, which is whatever the lines had
    /// actually taken (nothing, for an order that never got paid).
    pub fn mark_cancelled(&mut self, reason: Option<String>) -> CoreResult<Vec<StockAdjustment>> {
        self.ensure_open()?;

        self.status = OrderStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.cancel_reason = reason.filter(|r| !r.trim().is_empty());

        let restorations = self
            .items
            .iter_mut()
            .filter(|line| line.stock_applied != 0)
            .map(|line| {
                let delta = line.stock_applied;
                line.stock_applied = 0;
                StockAdjustment {
                    product_id: line.product_id.clone(),
                    delta,
                }
            })
            .collect();

        Ok(restorations)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn ensure_open(&self) -> CoreResult<()> {
        if self.status != OrderStatus::Open {
            return Err(CoreError::InvalidState {
                order_id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    fn line_mut(&mut self, line_item_id: &str) -> CoreResult<&mut LineItem> {
        self.items
            .iter_mut()
            .find(|i| i.id == line_item_id)
            .ok_or_else(|| CoreError::LineItemNotFound(line_item_id.to_string()))
    }

    fn recompute(&mut self) {
        self.totals = compute_totals(&self.items, self.order_discount);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductCategory;

    fn product(id: &str, price: i64, bps: u32, deposit: Option<i64>) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            description: None,
            category: ProductCategory::Drinks,
            barcode: None,
            price_cents: price,
            tax_rate_bps: bps,
            requires_deposit: deposit.is_some(),
            deposit_cents: deposit,
            stock_quantity: 100,
            min_stock_level: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn open_order() -> Order {
        Order::new("order-1", "202401011234", 7, false)
    }

    #[test]
    fn test_new_order_is_open_and_empty() {
        let order = open_order();
        assert_eq!(order.status(), OrderStatus::Open);
        assert!(order.items().is_empty());
        assert!(order.totals().total.is_zero());
        assert!(order.can_be_modified());
        assert_eq!(order.processing_time(), None);
    }

    #[test]
    fn test_scenario_price_tax_total() {
        let mut order = open_order();
        order.add_line_item(&product("p", 350, 1900, None), 2).unwrap();

        let line = &order.items()[0];
        assert_eq!(line.subtotal().to_string(), "7.00");
        assert_eq!(line.tax().to_string(), "1.33");
        assert_eq!(order.totals().total.to_string(), "8.33");
    }

    #[test]
    fn test_same_product_merges_into_one_line() {
        let mut order = open_order();
        let p = product("p", 100, 1900, None);
        let first = order.add_line_item(&p, 2).unwrap();
        let second = order.add_line_item(&p, 3).unwrap();

        assert_eq!(first, second);
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity, 5);
    }

    #[test]
    fn test_merge_keeps_original_snapshot() {
        let mut order = open_order();
        let mut p = product("p", 100, 1900, None);
        order.add_line_item(&p, 1).unwrap();

        p.price_cents = 999;
        p.name = "Renamed".to_string();
        order.add_line_item(&p, 1).unwrap();

        let line = &order.items()[0];
        assert_eq!(line.unit_price_cents, 100);
        assert_eq!(line.name_snapshot, "Product p");
        assert_eq!(order.totals().subtotal.cents(), 200);
    }

    #[test]
    fn test_deposit_snapshot() {
        let mut order = open_order();
        order.add_line_item(&product("bottle", 250, 1900, Some(25)), 4).unwrap();

        assert_eq!(order.items()[0].deposit_cents, Some(25));
        assert_eq!(order.totals().deposit.cents(), 100);
    }

    #[test]
    fn test_inactive_product_is_unavailable() {
        let mut order = open_order();
        let mut p = product("p", 100, 1900, None);
        p.is_active = false;

        let err = order.add_line_item(&p, 1).unwrap_err();
        assert_eq!(err, CoreError::ProductUnavailable("p".to_string()));
        assert!(order.items().is_empty());
    }

    #[test]
    fn test_quantity_limits() {
        let mut order = open_order();
        let p = product("p", 100, 0, None);

        assert!(matches!(order.add_line_item(&p, 0), Err(CoreError::Validation(_))));
        order.add_line_item(&p, 999).unwrap();
        assert!(matches!(
            order.add_line_item(&p, 1),
            Err(CoreError::QuantityTooLarge { requested: 1000, max: 999 })
        ));
        assert_eq!(order.items()[0].quantity, 999);
    }

    #[test]
    fn test_line_limit() {
        let mut order = open_order();
        for i in 0..MAX_ORDER_LINES {
            order.add_line_item(&product(&format!("p{}", i), 1, 0, None), 1).unwrap();
        }
        let err = order.add_line_item(&product("one-too-many", 1, 0, None), 1).unwrap_err();
        assert_eq!(err, CoreError::TooManyLines { max: MAX_ORDER_LINES });
    }

    #[test]
    fn test_remove_twice_is_not_found_and_totals_intact() {
        let mut order = open_order();
        let a = order.add_line_item(&product("a", 100, 0, None), 1).unwrap();
        order.add_line_item(&product("b", 200, 0, None), 1).unwrap();

        order.remove_line_item(&a).unwrap();
        let before = *order.totals();
        let err = order.remove_line_item(&a).unwrap_err();

        assert_eq!(err, CoreError::LineItemNotFound(a));
        assert_eq!(*order.totals(), before);
        assert_eq!(order.totals().total.cents(), 200);
    }

    #[test]
    fn test_set_quantity() {
        let mut order = open_order();
        let id = order.add_line_item(&product("a", 150, 0, None), 1).unwrap();

        order.set_line_item_quantity(&id, 4).unwrap();
        assert_eq!(order.totals().subtotal.cents(), 600);

        assert!(matches!(
            order.set_line_item_quantity(&id, 1000),
            Err(CoreError::QuantityTooLarge { .. })
        ));
        assert!(matches!(
            order.set_line_item_quantity("missing", 2),
            Err(CoreError::LineItemNotFound(_))
        ));
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut order = open_order();
        let id = order.add_line_item(&product("a", 150, 0, None), 2).unwrap();

        order.set_line_item_quantity(&id, 0).unwrap();
        assert!(order.items().is_empty());
        assert!(order.totals().total.is_zero());

        assert!(matches!(
            order.set_line_item_quantity(&id, -1),
            Err(CoreError::LineItemNotFound(_))
        ));
    }

    #[test]
    fn test_discount_clamps_total() {
        let mut order = open_order();
        order.add_line_item(&product("p", 350, 1900, None), 2).unwrap();

        order.apply_discount(Money::from_cents(10_000)).unwrap();
        assert_eq!(order.totals().total.to_string(), "0.00");
        assert!(order.totals().is_consistent());

        assert!(order.apply_discount(Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_huge_order_discount_on_top_of_line_discount_clamps() {
        let mut order = open_order();
        let id = order.add_line_item(&product("p", 500, 1900, Some(25)), 3).unwrap();

        order.apply_line_discount(&id, Money::from_cents(1)).unwrap();
        order.apply_discount(Money::from_cents(i64::MAX)).unwrap();

        assert_eq!(order.totals().discount.cents(), i64::MAX);
        assert!(order.totals().total.is_zero());
        assert!(order.totals().is_consistent());
    }

    #[test]
    fn test_huge_line_discount_times_quantity_clamps() {
        let mut order = open_order();
        let id = order.add_line_item(&product("p", 500, 1900, None), 3).unwrap();

        order.apply_line_discount(&id, Money::from_cents(i64::MAX / 2)).unwrap();

        assert_eq!(order.items()[0].discount_total().cents(), i64::MAX);
        assert_eq!(order.items()[0].discount_cents, i64::MAX / 2);
        assert!(order.totals().total.is_zero());
        assert!(order.totals().is_consistent());

        // A later, sane discount brings the order back
        order.apply_line_discount(&id, Money::zero()).unwrap();
        assert_eq!(order.totals().total.cents(), 1785);
    }

    #[test]
    fn test_line_discount() {
        let mut order = open_order();
        let id = order.add_line_item(&product("p", 500, 0, None), 2).unwrap();

        order.apply_line_discount(&id, Money::from_cents(100)).unwrap();
        assert_eq!(order.totals().discount.cents(), 200);
        assert_eq!(order.totals().total.cents(), 800);
    }

    #[test]
    fn test_mark_paid_records_change_and_stock() {
        let mut order = open_order();
        order.add_line_item(&product("p", 350, 1900, None), 2).unwrap();

        let adjustments = order.mark_paid(PaymentMethod::Cash, Money::from_cents(1000)).unwrap();

        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.change_amount().to_string(), "1.67");
        assert_eq!(order.paid_amount().cents(), 1000);
        assert_eq!(order.payment_method(), Some(PaymentMethod::Cash));
        assert!(order.completed_at().is_some());
        assert!(order.processing_time().is_some());
        assert_eq!(
            adjustments,
            vec![StockAdjustment {
                product_id: "p".to_string(),
                delta: -2
            }]
        );
        assert_eq!(order.items()[0].stock_applied, 2);
    }

    #[test]
    fn test_underpayment_is_recorded_without_change() {
        let mut order = open_order();
        order.add_line_item(&product("p", 1000, 0, None), 1).unwrap();

        order.mark_paid(PaymentMethod::Card, Money::from_cents(400)).unwrap();
        assert!(order.change_amount().is_zero());
        assert_eq!(order.remaining_amount().cents(), 600);
    }

    #[test]
    fn test_paid_order_rejects_every_mutation() {
        let mut order = open_order();
        let p = product("p", 100, 0, None);
        let id = order.add_line_item(&p, 1).unwrap();
        order.mark_paid(PaymentMethod::Cash, Money::from_cents(100)).unwrap();

        let invalid = |r: CoreResult<()>| matches!(r, Err(CoreError::InvalidState { .. }));
        assert!(invalid(order.add_line_item(&p, 1).map(|_| ())));
        assert!(invalid(order.remove_line_item(&id).map(|_| ())));
        assert!(invalid(order.set_line_item_quantity(&id, 3)));
        assert!(invalid(order.apply_discount(Money::from_cents(1))));
        assert!(invalid(order.apply_line_discount(&id, Money::from_cents(1))));
        assert!(invalid(order.mark_paid(PaymentMethod::Cash, Money::zero()).map(|_| ())));
        assert!(invalid(order.mark_cancelled(None).map(|_| ())));
        assert_eq!(order.status(), OrderStatus::Paid);
    }

    #[test]
    fn test_cancel_unpaid_order_restores_nothing() {
        let mut order = open_order();
        order.add_line_item(&product("p", 100, 0, None), 2).unwrap();

        let restorations = order.mark_cancelled(Some("customer left".to_string())).unwrap();

        assert!(restorations.is_empty());
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancel_reason(), Some("customer left"));

        let err = order.add_line_item(&product("q", 1, 0, None), 1).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { status: OrderStatus::Cancelled, .. }));
    }

    fn persisted(status: OrderStatus, items: Vec<LineItem>) -> PersistedOrder {
        PersistedOrder {
            id: "order-1".to_string(),
            order_number: "202401011234".to_string(),
            created_by: 7,
            created_at: Utc::now(),
            status,
            payment_method: None,
            items,
            order_discount: Money::zero(),
            paid_amount: Money::zero(),
            change_amount: Money::zero(),
            completed_at: None,
            is_test_order: false,
            cancel_reason: None,
            notes: None,
        }
    }

    #[test]
    fn test_cancel_gives_back_exactly_what_was_taken() {
        let mut taken = open_order();
        taken.add_line_item(&product("a", 100, 0, None), 3).unwrap();
        taken.add_line_item(&product("b", 200, 0, None), 5).unwrap();
        taken.add_line_item(&product("c", 300, 0, None), 1).unwrap();
        let mut items = taken.items().to_vec();
        items[0].stock_applied = 3;
        items[1].stock_applied = 2;

        let mut order = Order::restore(persisted(OrderStatus::Open, items));
        let restorations = order.mark_cancelled(None).unwrap();

        assert_eq!(
            restorations,
            vec![
                StockAdjustment {
                    product_id: "a".to_string(),
                    delta: 3
                },
                StockAdjustment {
                    product_id: "b".to_string(),
                    delta: 2
                },
            ]
        );
        assert!(order.items().iter().all(|i| i.stock_applied == 0));
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_notes() {
        let mut order = open_order();
        order.set_notes(Some("  table 4 ".to_string())).unwrap();
        assert_eq!(order.notes(), Some("table 4"));

        order.set_notes(Some("   ".to_string())).unwrap();
        assert_eq!(order.notes(), None);

        order.mark_cancelled(None).unwrap();
        assert!(matches!(
            order.set_notes(Some("late".to_string())),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_deserialize_recomputes_totals() {
        let mut order = open_order();
        order.add_line_item(&product("p", 350, 1900, None), 2).unwrap();

        let mut json = serde_json::to_value(&order).unwrap();
        json["totals"]["total"] = serde_json::json!(1);
        json["totals"]["tax"] = serde_json::json!(0);

        let decoded: Order = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.totals().total.cents(), 833);
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_restore_recomputes_totals() {
        let mut order = open_order();
        order.add_line_item(&product("p", 350, 1900, None), 2).unwrap();
        order.apply_discount(Money::from_cents(33)).unwrap();

        let restored = Order::restore(PersistedOrder {
            id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            created_by: order.created_by(),
            created_at: order.created_at(),
            status: order.status(),
            payment_method: None,
            items: order.items().to_vec(),
            order_discount: order.order_discount(),
            paid_amount: Money::zero(),
            change_amount: Money::zero(),
            completed_at: None,
            is_test_order: false,
            cancel_reason: None,
            notes: None,
        });

        assert_eq!(restored, order);
        assert_eq!(restored.totals().total.cents(), 800);
    }
}
