//! # Order Repository
//!
//! Persistence for orders and their line items.
//!
//! ## Storage Shape
//! ```text
//! orders (1) ────────< order_items (N)      ordered by `position`
//!    │                       │
//!    │ stored totals         │ frozen price / tax / deposit / name
//!    │ (derived on save)     │ stock_applied
//! ```
//!
//! Saving an order replaces its line items wholesale. The aggregate is the
//! source of truth; the rows are a snapshot of it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::{LineItem, Money, Order, OrderStatus, PaymentMethod, PersistedOrder};

const ORDER_COLUMNS: &str = "id, order_number, created_by, created_at, status, payment_method, \
     order_discount_cents, paid_cents, change_cents, completed_at, is_test_order, \
     cancel_reason, notes";

const ITEM_COLUMNS: &str = "id, order_id, product_id, name_snapshot, quantity, unit_price_cents, \
     tax_rate_bps, deposit_cents, discount_cents, stock_applied, created_at";

/// Row shape of the `orders` table (without the derived total columns).
#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    created_by: i64,
    created_at: DateTime<Utc>,
    status: OrderStatus,
    payment_method: Option<PaymentMethod>,
    order_discount_cents: i64,
    paid_cents: i64,
    change_cents: i64,
    completed_at: Option<DateTime<Utc>>,
    is_test_order: bool,
    cancel_reason: Option<String>,
    notes: Option<String>,
}

impl OrderRow {
    fn into_order(self, items: Vec<LineItem>) -> Order {
        Order::restore(PersistedOrder {
            id: self.id,
            order_number: self.order_number,
            created_by: self.created_by,
            created_at: self.created_at,
            status: self.status,
            payment_method: self.payment_method,
            items,
            order_discount: Money::from_cents(self.order_discount_cents),
            paid_amount: Money::from_cents(self.paid_cents),
            change_amount: Money::from_cents(self.change_cents),
            completed_at: self.completed_at,
            is_test_order: self.is_test_order,
            cancel_reason: self.cancel_reason,
            notes: self.notes,
        })
    }
}

// =============================================================================
// Statements
// =============================================================================

async fn fetch_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<LineItem>> {
    let sql = format!(
        "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY position",
        ITEM_COLUMNS
    );
    let items = sqlx::query_as::<_, LineItem>(&sql)
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

async fn fetch_where(
    conn: &mut SqliteConnection,
    column: &str,
    value: &str,
) -> DbResult<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE {} = ?1", ORDER_COLUMNS, column);
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let items = fetch_items(conn, &row.id).await?;
            Ok(Some(row.into_order(items)))
        }
        None => Ok(None),
    }
}

pub(crate) async fn fetch_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    fetch_where(conn, "id", id).await
}

pub(crate) async fn fetch_by_order_number(
    conn: &mut SqliteConnection,
    order_number: &str,
) -> DbResult<Option<Order>> {
    fetch_where(conn, "order_number", order_number).await
}

pub(crate) async fn order_number_exists(conn: &mut SqliteConnection, order_number: &str) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE order_number = ?1")
        .bind(order_number)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Upserts the order row and replaces its line items.
pub(crate) async fn save(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    let totals = order.totals();
    debug!(
        order_id = %order.id(),
        status = %order.status(),
        items = order.items().len(),
        total = %totals.total,
        "Saving order"
    );

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, created_by, created_at, status, payment_method,
            order_discount_cents, subtotal_cents, tax_cents, deposit_cents,
            discount_cents, total_cents, paid_cents, change_cents,
            completed_at, is_test_order, cancel_reason, notes, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
        ON CONFLICT (id) DO UPDATE SET
            status = excluded.status,
            payment_method = excluded.payment_method,
            order_discount_cents = excluded.order_discount_cents,
            subtotal_cents = excluded.subtotal_cents,
            tax_cents = excluded.tax_cents,
            deposit_cents = excluded.deposit_cents,
            discount_cents = excluded.discount_cents,
            total_cents = excluded.total_cents,
            paid_cents = excluded.paid_cents,
            change_cents = excluded.change_cents,
            completed_at = excluded.completed_at,
            cancel_reason = excluded.cancel_reason,
            notes = excluded.notes,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(order.id())
    .bind(order.order_number())
    .bind(order.created_by())
    .bind(order.created_at())
    .bind(order.status())
    .bind(order.payment_method())
    .bind(order.order_discount().cents())
    .bind(totals.subtotal.cents())
    .bind(totals.tax.cents())
    .bind(totals.deposit.cents())
    .bind(totals.discount.cents())
    .bind(totals.total.cents())
    .bind(order.paid_amount().cents())
    .bind(order.change_amount().cents())
    .bind(order.completed_at())
    .bind(order.is_test_order())
    .bind(order.cancel_reason())
    .bind(order.notes())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM order_items WHERE order_id = ?1")
        .bind(order.id())
        .execute(&mut *conn)
        .await?;

    for (position, item) in order.items().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, position, name_snapshot, quantity,
                unit_price_cents, tax_rate_bps, deposit_cents, discount_cents,
                stock_applied, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(order.id())
        .bind(&item.product_id)
        .bind(position as i64)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.tax_rate_bps)
        .bind(item.deposit_cents)
        .bind(item.discount_cents)
        .bind(item.stock_applied)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read-side access to orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Loads an order with its line items.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut conn, id).await
    }

    /// Loads an order by its human-readable number.
    pub async fn get_by_order_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_order_number(&mut conn, order_number.trim()).await
    }

    /// Orders created in `[start, end)`, oldest first, with their items.
    ///
    /// Items are loaded in one query and grouped in memory.
    pub async fn list_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!(
            "SELECT {} FROM orders WHERE created_at >= ?1 AND created_at < ?2 ORDER BY created_at, order_number",
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&mut *conn)
            .await?;

        let item_sql = format!(
            r#"
            SELECT {} FROM order_items
            WHERE order_id IN (SELECT id FROM orders WHERE created_at >= ?1 AND created_at < ?2)
            ORDER BY order_id, position
            "#,
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, LineItem>(&item_sql)
            .bind(start)
            .bind(end)
            .fetch_all(&mut *conn)
            .await?;

        let mut by_order: HashMap<String, Vec<LineItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id.clone()).or_default().push(item);
        }

        let orders: Vec<Order> = rows
            .into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect();

        debug!(count = orders.len(), "Loaded orders in range");
        Ok(orders)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use tally_core::{Product, ProductCategory};

    fn cola() -> Product {
        let now = Utc::now();
        Product {
            id: product::generate_product_id(),
            name: "Cola".to_string(),
            description: None,
            category: ProductCategory::Drinks,
            barcode: None,
            price_cents: 250,
            tax_rate_bps: 1900,
            requires_deposit: true,
            deposit_cents: Some(25),
            stock_quantity: 10,
            min_stock_level: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup() -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = cola();
        db.products().insert(&product).await.unwrap();
        (db, product)
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let (db, product) = setup().await;
        let mut order = Order::new("o-1", "202406011234", 7, false);
        order.add_line_item(&product, 3).unwrap();
        order.apply_discount(Money::from_cents(50)).unwrap();

        {
            let mut conn = db.pool().acquire().await.unwrap();
            save(&mut conn, &order).await.unwrap();
        }

        let loaded = db.orders().get_by_id("o-1").await.unwrap().unwrap();
        assert_eq!(loaded, order);
        assert_eq!(loaded.totals().total, order.totals().total);

        let by_number = db.orders().get_by_order_number("202406011234").await.unwrap();
        assert_eq!(by_number.map(|o| o.id().to_string()), Some("o-1".to_string()));
        assert!(db.orders().get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_items() {
        let (db, product) = setup().await;
        let mut order = Order::new("o-1", "202406011234", 7, false);
        let line = order.add_line_item(&product, 1).unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        save(&mut conn, &order).await.unwrap();

        order.remove_line_item(&line).unwrap();
        save(&mut conn, &order).await.unwrap();

        let loaded = fetch_by_id(&mut conn, "o-1").await.unwrap().unwrap();
        assert!(loaded.items().is_empty());
        assert!(order_number_exists(&mut conn, "202406011234").await.unwrap());
        assert!(!order_number_exists(&mut conn, "202406019999").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_in_range_groups_items() {
        let (db, product) = setup().await;
        let mut a = Order::new("o-a", "202406011001", 1, false);
        a.add_line_item(&product, 1).unwrap();
        let mut b = Order::new("o-b", "202406011002", 1, true);
        b.add_line_item(&product, 2).unwrap();

        {
            let mut conn = db.pool().acquire().await.unwrap();
            save(&mut conn, &a).await.unwrap();
            save(&mut conn, &b).await.unwrap();
        }

        let now = Utc::now();
        let orders = db
            .orders()
            .list_in_range(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);
        let b_loaded = orders.iter().find(|o| o.id() == "o-b").unwrap();
        assert_eq!(b_loaded.items()[0].quantity, 2);
        assert!(b_loaded.is_test_order());

        let none = db
            .orders()
            .list_in_range(now + Duration::hours(1), now + Duration::hours(2))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
