//! # Order Lifecycle Manager
//!
//! The only place where an order mutation and a stock change meet.
//!
//! ## One Operation, One Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  process_payment(order_id, Cash, 10.00)                                 │
//! │                                                                         │
//! │  validate input ─────────────── InvalidInput, nothing touched          │
//! │       │                                                                 │
//! │  store.begin() ───────────────┐                                        │
//! │       │                       │                                        │
//! │  load order ───── NotFound    │                                        │
//! │  order.mark_paid() ── InvalidState                                     │
//! │  save order                   │ any failure: tx dropped, rolled back   │
//! │  adjust stock (-qty per line) │                                        │
//! │  commit ──────────────────────┘                                        │
//! │       │                                                                 │
//! │  audit.record()  (after commit; its failure is only logged)            │
//! │       │                                                                 │
//! │  return Order snapshot                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every public operation returns a fresh snapshot of the order. Callers
//! never hold a live reference into the store.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::OrderSettings;
use crate::error::{OrderError, OrderResult};
use crate::ports::{AuditEvent, AuditSink, IdentityProvider, OrderStore, StoreError, StoreTransaction};
use tally_core::order_number::{format_order_number, SUFFIX_MAX, SUFFIX_MIN};
use tally_core::validation::{validate_non_negative_amount, validate_quantity};
use tally_core::{
    AuditAction, Money, Order, PaymentMethod, StockAdjustment, ValidationError, MAX_ITEM_QUANTITY,
};

// =============================================================================
// Order Number Suffixes
// =============================================================================

/// Source of the 4-digit suffix appended to the date in an order number.
pub trait SuffixSource: Send + Sync {
    /// A value in `SUFFIX_MIN..=SUFFIX_MAX`.
    fn next_suffix(&self) -> u16;
}

/// Uniformly random suffixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSuffix;

impl SuffixSource for RandomSuffix {
    fn next_suffix(&self) -> u16 {
        rand::thread_rng().gen_range(SUFFIX_MIN..=SUFFIX_MAX)
    }
}

/// Longest order note accepted, in characters.
pub const MAX_NOTES_LENGTH: usize = 500;

// =============================================================================
// Manager
// =============================================================================

/// Transactional order operations.
///
/// ## Usage
/// ```rust,ignore
/// let manager = OrderLifecycleManager::new(store, audit, identity, config.orders.clone());
///
/// let order = manager.create_order(cashier_id).await?;
/// let order = manager.add_item(order.id(), &product_id, 2).await?;
/// let order = manager.process_payment(order.id(), PaymentMethod::Cash, Money::from_cents(1000)).await?;
/// println!("change: {}", order.change_amount());
/// ```
pub struct OrderLifecycleManager {
    store: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditSink>,
    identity: Arc<dyn IdentityProvider>,
    settings: OrderSettings,
    suffixes: Arc<dyn SuffixSource>,
}

impl OrderLifecycleManager {
    pub fn new(
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditSink>,
        identity: Arc<dyn IdentityProvider>,
        settings: OrderSettings,
    ) -> Self {
        OrderLifecycleManager {
            store,
            audit,
            identity,
            settings,
            suffixes: Arc::new(RandomSuffix),
        }
    }

    /// Replaces the random suffix source.
    pub fn with_suffix_source(mut self, suffixes: Arc<dyn SuffixSource>) -> Self {
        self.suffixes = suffixes;
        self
    }

    pub fn settings(&self) -> &OrderSettings {
        &self.settings
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_order(&self, order_id: &str) -> OrderResult<Order> {
        let result = async {
            require("order_id", order_id)?;
            self.store
                .get_order(order_id)
                .await?
                .ok_or_else(|| OrderError::not_found("Order", order_id))
        }
        .await;
        logged("get_order", result)
    }

    pub async fn find_by_order_number(&self, order_number: &str) -> OrderResult<Order> {
        let result = async {
            require("order_number", order_number)?;
            self.store
                .find_order_by_number(order_number.trim())
                .await?
                .ok_or_else(|| OrderError::not_found("Order", order_number.trim()))
        }
        .await;
        logged("find_by_order_number", result)
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Creates an empty `Open` order with a fresh order number.
    ///
    /// ## Order Numbers
    /// `yyyyMMdd` (UTC) followed by a random suffix in 1000..=9999. A drawn
    /// number already in use is redrawn; a write that loses a race to
    /// another terminal starts a new transaction. Both count against
    /// `orders.number_attempts`.
    pub async fn create_order(&self, cashier_id: i64) -> OrderResult<Order> {
        debug!(cashier_id, "Creating order");

        let result = self.create_order_with_retries(cashier_id).await;
        if let Ok(order) = &result {
            info!(
                order_id = %order.id(),
                order_number = %order.order_number(),
                test = order.is_test_order(),
                "Order created"
            );
            self.audit(
                AuditAction::OrderCreated,
                order.id(),
                format!("Order {} created", order.order_number()),
            )
            .await;
        }
        logged("create_order", result)
    }

    async fn create_order_with_retries(&self, cashier_id: i64) -> OrderResult<Order> {
        let budget = self.settings.number_attempts;
        let date = Utc::now().date_naive();
        let mut attempts = 0;

        while attempts < budget {
            let mut tx = self.store.begin().await?;

            let mut number = None;
            while attempts < budget {
                attempts += 1;
                let candidate = format_order_number(date, self.suffixes.next_suffix());
                if !tx.order_number_exists(&candidate).await? {
                    number = Some(candidate);
                    break;
                }
                debug!(order_number = %candidate, attempts, "Order number taken, redrawing");
            }
            let Some(number) = number else {
                break;
            };

            let order = Order::new(
                Uuid::new_v4().to_string(),
                number,
                cashier_id,
                self.settings.test_mode,
            );

            let written = match tx.save_order(&order).await {
                Ok(()) => tx.commit().await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => return Ok(order),
                Err(StoreError::Conflict { field, value }) => {
                    debug!(field = %field, value = %value, attempts, "Lost order number race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(OrderError::OrderNumberExhausted { attempts: budget })
    }

    // -------------------------------------------------------------------------
    // Line Items
    // -------------------------------------------------------------------------

    /// Adds `quantity` units of a product, merging into an existing line for
    /// the same product.
    pub async fn add_item(&self, order_id: &str, product_id: &str, quantity: i64) -> OrderResult<Order> {
        debug!(order_id = %order_id, product_id = %product_id, quantity, "Adding item");

        let result = async {
            require("order_id", order_id)?;
            require("product_id", product_id)?;
            validate_quantity(quantity)?;

            let (mut tx, mut order) = self.open(order_id).await?;
            let product = tx
                .load_product(product_id)
                .await?
                .ok_or_else(|| OrderError::not_found("Product", product_id))?;

            order.add_line_item(&product, quantity)?;

            let message = format!("Added {} x {} to order {}", quantity, product.name, order.order_number());
            self.commit(tx, order, &[], AuditAction::OrderItemAdded, message).await
        }
        .await;
        logged("add_item", result)
    }

    /// Removes a line. Removing it again yields `NotFound`.
    pub async fn remove_item(&self, order_id: &str, line_item_id: &str) -> OrderResult<Order> {
        debug!(order_id = %order_id, line_item_id = %line_item_id, "Removing item");

        let result = async {
            require("order_id", order_id)?;
            require("line_item_id", line_item_id)?;

            let (tx, mut order) = self.open(order_id).await?;
            let removed = order.remove_line_item(line_item_id)?;

            let message = format!(
                "Removed {} x {} from order {}",
                removed.quantity,
                removed.name_snapshot,
                order.order_number()
            );
            self.commit(tx, order, &[], AuditAction::OrderItemRemoved, message).await
        }
        .await;
        logged("remove_item", result)
    }

    /// Sets a line's quantity; zero or less removes the line.
    pub async fn set_quantity(&self, order_id: &str, line_item_id: &str, quantity: i64) -> OrderResult<Order> {
        debug!(order_id = %order_id, line_item_id = %line_item_id, quantity, "Setting quantity");

        let result = async {
            require("order_id", order_id)?;
            require("line_item_id", line_item_id)?;
            if quantity > MAX_ITEM_QUANTITY {
                return Err(OrderError::InvalidInput(ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 1,
                    max: MAX_ITEM_QUANTITY,
                }));
            }

            let (tx, mut order) = self.open(order_id).await?;
            order.set_line_item_quantity(line_item_id, quantity)?;

            let (action, message) = if quantity <= 0 {
                (
                    AuditAction::OrderItemRemoved,
                    format!("Removed line {} from order {}", line_item_id, order.order_number()),
                )
            } else {
                (
                    AuditAction::OrderModified,
                    format!("Set line {} to {} on order {}", line_item_id, quantity, order.order_number()),
                )
            };
            self.commit(tx, order, &[], action, message).await
        }
        .await;
        logged("set_quantity", result)
    }

    // -------------------------------------------------------------------------
    // Discounts
    // -------------------------------------------------------------------------

    /// Sets the order-level discount. It may exceed the order value.
    pub async fn apply_discount(&self, order_id: &str, amount: Money) -> OrderResult<Order> {
        debug!(order_id = %order_id, amount = %amount, "Applying discount");

        let result = async {
            require("order_id", order_id)?;
            validate_non_negative_amount("discount", amount.cents())?;

            let (tx, mut order) = self.open(order_id).await?;
            order.apply_discount(amount)?;

            let message = format!("Discount {} on order {}", amount, order.order_number());
            self.commit(tx, order, &[], AuditAction::OrderModified, message).await
        }
        .await;
        logged("apply_discount", result)
    }

    /// Sets a per-unit discount on one line.
    pub async fn apply_line_discount(
        &self,
        order_id: &str,
        line_item_id: &str,
        per_unit: Money,
    ) -> OrderResult<Order> {
        debug!(order_id = %order_id, line_item_id = %line_item_id, per_unit = %per_unit, "Applying line discount");

        let result = async {
            require("order_id", order_id)?;
            require("line_item_id", line_item_id)?;
            validate_non_negative_amount("discount", per_unit.cents())?;

            let (tx, mut order) = self.open(order_id).await?;
            order.apply_line_discount(line_item_id, per_unit)?;

            let message = format!(
                "Line discount {} per unit on line {} of order {}",
                per_unit,
                line_item_id,
                order.order_number()
            );
            self.commit(tx, order, &[], AuditAction::OrderModified, message).await
        }
        .await;
        logged("apply_line_discount", result)
    }

    /// Replaces the order's free-text note. `None` or blank text clears it.
    pub async fn set_notes(&self, order_id: &str, notes: Option<String>) -> OrderResult<Order> {
        debug!(order_id = %order_id, "Setting order notes");

        let result = async {
            require("order_id", order_id)?;
            if let Some(text) = &notes {
                if text.trim().chars().count() > MAX_NOTES_LENGTH {
                    return Err(OrderError::InvalidInput(ValidationError::TooLong {
                        field: "notes".to_string(),
                        max: MAX_NOTES_LENGTH,
                    }));
                }
            }

            let (tx, mut order) = self.open(order_id).await?;
            order.set_notes(notes)?;

            let message = match order.notes() {
                Some(_) => format!("Notes updated on order {}", order.order_number()),
                None => format!("Notes cleared on order {}", order.order_number()),
            };
            self.commit(tx, order, &[], AuditAction::OrderModified, message).await
        }
        .await;
        logged("set_notes", result)
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Records the payment and takes every line's quantity out of stock.
    ///
    /// Stock may go negative; a sale is never blocked on inventory.
    pub async fn process_payment(&self, order_id: &str, method: PaymentMethod, paid: Money) -> OrderResult<Order> {
        debug!(order_id = %order_id, method = %method, paid = %paid, "Processing payment");

        let result = async {
            require("order_id", order_id)?;
            validate_non_negative_amount("paid_amount", paid.cents())?;

            let (tx, mut order) = self.open(order_id).await?;
            let adjustments = order.mark_paid(method, paid)?;

            let totals = order.totals();
            let message = format!(
                "Order {} paid by {}: total {}, paid {}, change {}",
                order.order_number(),
                method,
                totals.total,
                order.paid_amount(),
                order.change_amount()
            );
            self.commit(tx, order, &adjustments, AuditAction::OrderPaid, message).await
        }
        .await;

        if let Ok(order) = &result {
            info!(
                order_id = %order.id(),
                order_number = %order.order_number(),
                total = %order.totals().total,
                change = %order.change_amount(),
                "Payment recorded"
            );
        }
        logged("process_payment", result)
    }

    /// Cancels an `Open` order and gives back whatever stock its lines took.
    pub async fn cancel_order(&self, order_id: &str, reason: Option<String>) -> OrderResult<Order> {
        debug!(order_id = %order_id, reason = ?reason, "Cancelling order");

        let result = async {
            require("order_id", order_id)?;

            let (tx, mut order) = self.open(order_id).await?;
            let restorations = order.mark_cancelled(reason)?;

            let message = match order.cancel_reason() {
                Some(reason) => format!("Order {} cancelled: {}", order.order_number(), reason),
                None => format!("Order {} cancelled", order.order_number()),
            };
            self.commit(tx, order, &restorations, AuditAction::OrderCancelled, message).await
        }
        .await;

        if let Ok(order) = &result {
            info!(order_id = %order.id(), order_number = %order.order_number(), "Order cancelled");
        }
        logged("cancel_order", result)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Begins a transaction and loads the order inside it.
    async fn open(&self, order_id: &str) -> OrderResult<(Box<dyn StoreTransaction>, Order)> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .load_order(order_id)
            .await?
            .ok_or_else(|| OrderError::not_found("Order", order_id))?;
        Ok((tx, order))
    }

    /// Saves the order, applies the stock deltas, commits, then audits.
    async fn commit(
        &self,
        mut tx: Box<dyn StoreTransaction>,
        order: Order,
        adjustments: &[StockAdjustment],
        action: AuditAction,
        message: String,
    ) -> OrderResult<Order> {
        tx.save_order(&order).await?;

        for adjustment in adjustments {
            let level = tx.adjust_stock(&adjustment.product_id, adjustment.delta).await?;
            if level < 0 {
                warn!(
                    product_id = %adjustment.product_id,
                    stock = level,
                    "Stock is negative after sale"
                );
            }
        }

        tx.commit().await?;
        self.audit(action, order.id(), message).await;
        Ok(order)
    }

    async fn audit(&self, action: AuditAction, subject: &str, message: String) {
        let event = AuditEvent {
            actor_id: self.identity.current_user_id(),
            action,
            subject: subject.to_string(),
            message,
            at: Utc::now(),
        };
        if let Err(e) = self.audit.record(event).await {
            warn!(action = %action, subject = %subject, error = %e, "Audit sink failed");
        }
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Logs a failed operation and passes the result through.
pub(crate) fn logged<T>(operation: &'static str, result: OrderResult<T>) -> OrderResult<T> {
    if let Err(err) = &result {
        match err {
            OrderError::PersistenceFailure(cause) => {
                error!(operation, error = %cause, "Operation failed, nothing committed");
            }
            other => {
                warn!(operation, code = ?other.code(), error = %other, "Operation rejected");
            }
        }
    }
    result
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::RecordingAuditSink;
    use crate::error::ErrorCode;
    use crate::memory::MemoryStore;
    use crate::ports::{AuditError, StaticIdentity, StoreResult};
    use crate::sqlite::SqliteStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tally_core::{DepositReturn, LineItem, OrderStatus, PersistedOrder, Product, ProductCategory};
    use tally_db::{Database, DbConfig};

    fn product(id: &str, price_cents: i64, tax_rate_bps: u32, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            description: None,
            category: ProductCategory::Drinks,
            barcode: None,
            price_cents,
            tax_rate_bps,
            requires_deposit: false,
            deposit_cents: None,
            stock_quantity: stock,
            min_stock_level: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    async fn store() -> MemoryStore {
        let mut inactive = product("gone", 100, 1900, 5);
        inactive.is_active = false;
        MemoryStore::new()
            .with_products([product("p1", 350, 1900, 100), product("p2", 200, 700, 10), inactive])
            .await
    }

    fn manager_with(store: Arc<dyn OrderStore>, audit: Arc<dyn AuditSink>) -> OrderLifecycleManager {
        OrderLifecycleManager::new(store, audit, Arc::new(StaticIdentity(7)), OrderSettings::default())
    }

    async fn setup() -> (OrderLifecycleManager, MemoryStore, RecordingAuditSink) {
        let store = store().await;
        let audit = RecordingAuditSink::new();
        let manager = manager_with(Arc::new(store.clone()), Arc::new(audit.clone()));
        (manager, store, audit)
    }

    async fn stock(store: &MemoryStore, id: &str) -> i64 {
        store.get_product(id).await.unwrap().unwrap().stock_quantity
    }

    // -------------------------------------------------------------------------
    // Scenarios
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_sale_with_change_and_stock_decrement() {
        let (manager, store, _) = setup().await;

        let order = manager.create_order(3).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Open);
        assert_eq!(order.created_by(), 3);
        assert_eq!(order.order_number().len(), 12);

        let order = manager.add_item(order.id(), "p1", 2).await.unwrap();
        assert_eq!(order.totals().subtotal, Money::from_cents(700));
        assert_eq!(order.totals().tax, Money::from_cents(133));
        assert_eq!(order.totals().total, Money::from_cents(833));

        let order = manager
            .process_payment(order.id(), PaymentMethod::Cash, Money::from_cents(1000))
            .await
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.change_amount(), Money::from_cents(167));
        assert!(order.completed_at().is_some());

        assert_eq!(stock(&store, "p1").await, 98);

        let stored = manager.get_order(order.id()).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn test_cancel_unpaid_order_leaves_stock() {
        let (manager, store, _) = setup().await;

        let order = manager.create_order(1).await.unwrap();
        manager.add_item(order.id(), "p1", 2).await.unwrap();
        let order = manager.cancel_order(order.id(), Some("customer left".into())).await.unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancel_reason(), Some("customer left"));
        assert_eq!(stock(&store, "p1").await, 100);
    }

    /// An open order whose lines already hold stock, e.g. one reopened
    /// after a partial fulfilment.
    fn order_holding_stock() -> Order {
        let now = Utc::now();
        let line = |id: &str, product_id: &str, quantity: i64, stock_applied: i64| LineItem {
            id: id.to_string(),
            order_id: "held".to_string(),
            product_id: product_id.to_string(),
            name_snapshot: format!("Product {}", product_id),
            quantity,
            unit_price_cents: 350,
            tax_rate_bps: 1900,
            deposit_cents: None,
            discount_cents: 0,
            stock_applied,
            created_at: now,
        };
        Order::restore(PersistedOrder {
            id: "held".to_string(),
            order_number: "202406014711".to_string(),
            created_by: 1,
            created_at: now,
            status: OrderStatus::Open,
            payment_method: None,
            items: vec![line("l1", "p1", 2, 2), line("l2", "p2", 4, 3), line("l3", "p1", 1, 0)],
            order_discount: Money::zero(),
            paid_amount: Money::zero(),
            change_amount: Money::zero(),
            completed_at: None,
            is_test_order: false,
            cancel_reason: None,
            notes: None,
        })
    }

    #[tokio::test]
    async fn test_cancel_gives_back_applied_stock() {
        let (manager, store, audit) = setup().await;

        let mut tx = store.begin().await.unwrap();
        tx.save_order(&order_holding_stock()).await.unwrap();
        tx.commit().await.unwrap();

        let order = manager.cancel_order("held", None).await.unwrap();
        assert!(order.is_cancelled());
        assert!(order.items().iter().all(|l| l.stock_applied == 0));

        // Only what the lines took comes back: p1 +2, p2 +3
        assert_eq!(stock(&store, "p1").await, 102);
        assert_eq!(stock(&store, "p2").await, 13);

        let stored = manager.get_order("held").await.unwrap();
        assert!(stored.items().iter().all(|l| l.stock_applied == 0));
        assert_eq!(audit.events().await.pop().unwrap().action, AuditAction::OrderCancelled);

        // A second cancel is rejected and gives nothing back twice
        let err = manager.cancel_order("held", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
        assert_eq!(stock(&store, "p1").await, 102);
    }

    #[tokio::test]
    async fn test_notes() {
        let (manager, _, audit) = setup().await;

        let order = manager.create_order(1).await.unwrap();
        let order = manager
            .set_notes(order.id(), Some("  table 4, no ice ".into()))
            .await
            .unwrap();
        assert_eq!(order.notes(), Some("table 4, no ice"));
        assert_eq!(manager.get_order(order.id()).await.unwrap().notes(), Some("table 4, no ice"));

        let last = audit.events().await.pop().unwrap();
        assert_eq!(last.action, AuditAction::OrderModified);
        assert!(last.message.starts_with("Notes updated"));

        let order = manager.set_notes(order.id(), Some("   ".into())).await.unwrap();
        assert_eq!(order.notes(), None);

        let err = manager
            .set_notes(order.id(), Some("x".repeat(MAX_NOTES_LENGTH + 1)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);

        manager.cancel_order(order.id(), None).await.unwrap();
        let err = manager.set_notes(order.id(), Some("late".into())).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }

    #[tokio::test]
    async fn test_discount_clamps_total() {
        let (manager, _, _) = setup().await;

        let order = manager.create_order(1).await.unwrap();
        manager.add_item(order.id(), "p1", 2).await.unwrap();
        let order = manager.apply_discount(order.id(), Money::from_cents(10_000)).await.unwrap();

        assert_eq!(order.totals().total, Money::zero());

        let err = manager
            .apply_discount(order.id(), Money::from_cents(-1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_line_discount_and_quantity_changes() {
        let (manager, _, _) = setup().await;

        let order = manager.create_order(1).await.unwrap();
        let order = manager.add_item(order.id(), "p2", 3).await.unwrap();
        let line = order.items()[0].id.clone();

        let order = manager
            .apply_line_discount(order.id(), &line, Money::from_cents(50))
            .await
            .unwrap();
        assert_eq!(order.totals().discount, Money::from_cents(150));

        let order = manager.set_quantity(order.id(), &line, 5).await.unwrap();
        assert_eq!(order.items()[0].quantity, 5);

        let order = manager.set_quantity(order.id(), &line, 0).await.unwrap();
        assert!(order.items().is_empty());
        assert_eq!(order.totals().total, Money::zero());

        let err = manager.set_quantity(order.id(), &line, 1000).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_same_product_merges() {
        let (manager, _, _) = setup().await;

        let order = manager.create_order(1).await.unwrap();
        manager.add_item(order.id(), "p1", 1).await.unwrap();
        let order = manager.add_item(order.id(), "p1", 2).await.unwrap();

        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_remove_twice_is_not_found() {
        let (manager, _, _) = setup().await;

        let order = manager.create_order(1).await.unwrap();
        let order = manager.add_item(order.id(), "p1", 1).await.unwrap();
        let line = order.items()[0].id.clone();

        let order = manager.remove_item(order.id(), &line).await.unwrap();
        assert!(order.items().is_empty());

        let err = manager.remove_item(order.id(), &line).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { .. }));
        assert_eq!(manager.get_order(order.id()).await.unwrap().totals().total, Money::zero());
    }

    // -------------------------------------------------------------------------
    // Error Contract
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_terminal_orders_reject_mutation() {
        let (manager, store, _) = setup().await;

        let order = manager.create_order(1).await.unwrap();
        let order = manager.add_item(order.id(), "p1", 1).await.unwrap();
        let line = order.items()[0].id.clone();
        manager
            .process_payment(order.id(), PaymentMethod::Card, Money::from_cents(417))
            .await
            .unwrap();

        let id = order.id();
        let results = [
            manager.add_item(id, "p1", 1).await.map(|_| ()),
            manager.remove_item(id, &line).await.map(|_| ()),
            manager.set_quantity(id, &line, 2).await.map(|_| ()),
            manager.apply_discount(id, Money::from_cents(10)).await.map(|_| ()),
            manager.apply_line_discount(id, &line, Money::from_cents(10)).await.map(|_| ()),
            manager.process_payment(id, PaymentMethod::Cash, Money::from_cents(500)).await.map(|_| ()),
            manager.cancel_order(id, None).await.map(|_| ()),
        ];
        for result in results {
            assert!(matches!(
                result,
                Err(OrderError::InvalidState { status: OrderStatus::Paid, .. })
            ));
        }

        // The failed cancel gave nothing back
        assert_eq!(stock(&store, "p1").await, 99);
    }

    #[tokio::test]
    async fn test_missing_and_unavailable() {
        let (manager, _, _) = setup().await;

        let err = manager.add_item("missing", "p1", 1).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { ref entity, .. } if entity == "Order"));

        let order = manager.create_order(1).await.unwrap();
        let err = manager.add_item(order.id(), "missing", 1).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { ref entity, .. } if entity == "Product"));

        let err = manager.add_item(order.id(), "gone", 1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductUnavailable);

        let err = manager.add_item(order.id(), "p1", 0).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);

        let err = manager.add_item(order.id(), "p1", 1000).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);

        let err = manager.find_by_order_number("209901019999").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let found = manager.find_by_order_number(order.order_number()).await.unwrap();
        assert_eq!(found.id(), order.id());
    }

    // -------------------------------------------------------------------------
    // Order Numbers
    // -------------------------------------------------------------------------

    struct SequenceSuffix {
        values: Vec<u16>,
        next: AtomicUsize,
    }

    impl SuffixSource for SequenceSuffix {
        fn next_suffix(&self) -> u16 {
            let i = self.next.fetch_add(1, Ordering::SeqCst);
            self.values[i.min(self.values.len() - 1)]
        }
    }

    fn sequence(values: &[u16]) -> Arc<SequenceSuffix> {
        Arc::new(SequenceSuffix {
            values: values.to_vec(),
            next: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_order_number_collision_redraws() {
        let (manager, _, _) = setup().await;
        let manager = manager.with_suffix_source(sequence(&[4242, 4242, 4243]));

        let first = manager.create_order(1).await.unwrap();
        let second = manager.create_order(1).await.unwrap();

        assert!(first.order_number().ends_with("4242"));
        assert!(second.order_number().ends_with("4243"));
    }

    #[tokio::test]
    async fn test_order_number_exhausted() {
        let (manager, _, audit) = setup().await;
        let manager = manager.with_suffix_source(sequence(&[4242]));

        manager.create_order(1).await.unwrap();
        let err = manager.create_order(1).await.unwrap_err();

        assert!(matches!(err, OrderError::OrderNumberExhausted { attempts: 10 }));
        assert_eq!(audit.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_test_mode_flags_orders() {
        let store = store().await;
        let settings = OrderSettings {
            test_mode: true,
            ..OrderSettings::default()
        };
        let manager = OrderLifecycleManager::new(
            Arc::new(store),
            Arc::new(RecordingAuditSink::new()),
            Arc::new(StaticIdentity(1)),
            settings,
        );

        assert!(manager.create_order(1).await.unwrap().is_test_order());
    }

    // -------------------------------------------------------------------------
    // Atomicity
    // -------------------------------------------------------------------------

    #[derive(Clone, Copy, PartialEq)]
    enum FailPoint {
        SaveOrder,
        AdjustStock,
        Commit,
    }

    /// Wraps a store and fails one step of every transaction.
    struct FailingStore {
        inner: MemoryStore,
        fail: FailPoint,
    }

    struct FailingTx {
        inner: Box<dyn StoreTransaction>,
        fail: FailPoint,
    }

    fn injected() -> StoreError {
        StoreError::Backend("injected failure".to_string())
    }

    #[async_trait]
    impl OrderStore for FailingStore {
        async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
            Ok(Box::new(FailingTx {
                inner: self.inner.begin().await?,
                fail: self.fail,
            }))
        }
        async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
            self.inner.get_order(id).await
        }
        async fn find_order_by_number(&self, n: &str) -> StoreResult<Option<Order>> {
            self.inner.find_order_by_number(n).await
        }
        async fn list_orders(&self, s: DateTime<Utc>, e: DateTime<Utc>) -> StoreResult<Vec<Order>> {
            self.inner.list_orders(s, e).await
        }
        async fn get_product(&self, id: &str) -> StoreResult<Option<Product>> {
            self.inner.get_product(id).await
        }
        async fn find_product_by_barcode(&self, b: &str) -> StoreResult<Option<Product>> {
            self.inner.find_product_by_barcode(b).await
        }
        async fn list_products(&self, all: bool) -> StoreResult<Vec<Product>> {
            self.inner.list_products(all).await
        }
        async fn search_products(&self, q: &str, limit: u32) -> StoreResult<Vec<Product>> {
            self.inner.search_products(q, limit).await
        }
        async fn low_stock_products(&self) -> StoreResult<Vec<Product>> {
            self.inner.low_stock_products().await
        }
        async fn list_deposit_returns(&self, s: DateTime<Utc>, e: DateTime<Utc>) -> StoreResult<Vec<DepositReturn>> {
            self.inner.list_deposit_returns(s, e).await
        }
    }

    #[async_trait]
    impl StoreTransaction for FailingTx {
        async fn load_order(&mut self, id: &str) -> StoreResult<Option<Order>> {
            self.inner.load_order(id).await
        }
        async fn save_order(&mut self, order: &Order) -> StoreResult<()> {
            if self.fail == FailPoint::SaveOrder {
                return Err(injected());
            }
            self.inner.save_order(order).await
        }
        async fn order_number_exists(&mut self, n: &str) -> StoreResult<bool> {
            self.inner.order_number_exists(n).await
        }
        async fn load_product(&mut self, id: &str) -> StoreResult<Option<Product>> {
            self.inner.load_product(id).await
        }
        async fn insert_product(&mut self, p: &Product) -> StoreResult<()> {
            self.inner.insert_product(p).await
        }
        async fn save_product(&mut self, p: &Product) -> StoreResult<()> {
            self.inner.save_product(p).await
        }
        async fn adjust_stock(&mut self, id: &str, delta: i64) -> StoreResult<i64> {
            if self.fail == FailPoint::AdjustStock {
                return Err(injected());
            }
            self.inner.adjust_stock(id, delta).await
        }
        async fn set_stock(&mut self, id: &str, q: i64) -> StoreResult<()> {
            self.inner.set_stock(id, q).await
        }
        async fn barcode_taken(&mut self, b: &str, ex: Option<&str>) -> StoreResult<bool> {
            self.inner.barcode_taken(b, ex).await
        }
        async fn delete_product(&mut self, id: &str) -> StoreResult<bool> {
            self.inner.delete_product(id).await
        }
        async fn insert_deposit_return(&mut self, r: &DepositReturn) -> StoreResult<()> {
            self.inner.insert_deposit_return(r).await
        }
        async fn commit(self: Box<Self>) -> StoreResult<()> {
            if self.fail == FailPoint::Commit {
                return Err(injected());
            }
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn test_failed_payment_leaves_no_partial_state() {
        for fail in [FailPoint::SaveOrder, FailPoint::AdjustStock, FailPoint::Commit] {
            let (healthy, store, audit) = setup().await;
            let order = healthy.create_order(1).await.unwrap();
            healthy.add_item(order.id(), "p1", 2).await.unwrap();
            healthy.add_item(order.id(), "p2", 1).await.unwrap();
            let events_before = audit.events().await.len();

            let failing = manager_with(
                Arc::new(FailingStore {
                    inner: store.clone(),
                    fail,
                }),
                Arc::new(audit.clone()),
            );
            let err = failing
                .process_payment(order.id(), PaymentMethod::Cash, Money::from_cents(2000))
                .await
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::PersistenceFailure);

            // Nothing was kept and nothing was audited
            let stored = store.get_order(order.id()).await.unwrap().unwrap();
            assert_eq!(stored.status(), OrderStatus::Open);
            assert_eq!(stock(&store, "p1").await, 100);
            assert_eq!(stock(&store, "p2").await, 10);
            assert_eq!(audit.events().await.len(), events_before);

            // Retrying on a healthy store succeeds
            let paid = healthy
                .process_payment(order.id(), PaymentMethod::Cash, Money::from_cents(2000))
                .await
                .unwrap();
            assert!(paid.is_paid());
            assert_eq!(stock(&store, "p1").await, 98);
            assert_eq!(stock(&store, "p2").await, 9);
        }
    }

    #[tokio::test]
    async fn test_failed_add_item_is_not_saved() {
        let (healthy, store, _) = setup().await;
        let order = healthy.create_order(1).await.unwrap();

        let failing = manager_with(
            Arc::new(FailingStore {
                inner: store.clone(),
                fail: FailPoint::Commit,
            }),
            Arc::new(RecordingAuditSink::new()),
        );
        assert!(failing.add_item(order.id(), "p1", 1).await.is_err());
        assert!(store.get_order(order.id()).await.unwrap().unwrap().items().is_empty());
    }

    // -------------------------------------------------------------------------
    // Audit
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_audit_events_after_commit() {
        let (manager, _, audit) = setup().await;

        let order = manager.create_order(1).await.unwrap();
        manager.add_item(order.id(), "p1", 1).await.unwrap();
        manager
            .process_payment(order.id(), PaymentMethod::Cash, Money::from_cents(500))
            .await
            .unwrap();
        let _ = manager.cancel_order(order.id(), None).await;

        let events = audit.events().await;
        let actions: Vec<AuditAction> = events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::OrderCreated, AuditAction::OrderItemAdded, AuditAction::OrderPaid]
        );
        assert!(events.iter().all(|e| e.actor_id == 7 && e.subject == order.id()));
    }

    struct BrokenSink {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
            *self.calls.lock().unwrap() += 1;
            Err(AuditError("sink offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_operation() {
        let sink = Arc::new(BrokenSink { calls: Mutex::new(0) });
        let manager = manager_with(Arc::new(store().await), sink.clone());

        let order = manager.create_order(1).await.unwrap();
        manager.add_item(order.id(), "p1", 1).await.unwrap();

        assert_eq!(*sink.calls.lock().unwrap(), 2);
    }

    // -------------------------------------------------------------------------
    // SQLite
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_full_flow_on_sqlite() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products().insert(&product("p1", 350, 1900, 1)).await.unwrap();
        let manager = manager_with(
            Arc::new(SqliteStore::new(db.clone())),
            Arc::new(RecordingAuditSink::new()),
        );

        let order = manager.create_order(1).await.unwrap();
        manager.add_item(order.id(), "p1", 2).await.unwrap();
        let order = manager
            .process_payment(order.id(), PaymentMethod::Cash, Money::from_cents(1000))
            .await
            .unwrap();
        assert_eq!(order.change_amount(), Money::from_cents(167));

        // Overselling is allowed
        let stock = db.products().get_by_id("p1").await.unwrap().unwrap().stock_quantity;
        assert_eq!(stock, -1);

        let loaded = manager.find_by_order_number(order.order_number()).await.unwrap();
        assert_eq!(loaded, order);

        let second = manager.create_order(1).await.unwrap();
        manager.add_item(second.id(), "p1", 2).await.unwrap();
        manager.cancel_order(second.id(), None).await.unwrap();
        let stock = db.products().get_by_id("p1").await.unwrap().unwrap().stock_quantity;
        assert_eq!(stock, -1);
    }
}
