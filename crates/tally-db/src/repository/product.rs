//! # Product Repository
//!
//! Database operations for catalog products.
//!
//! The statements live in free functions over `&mut SqliteConnection` so the
//! same SQL runs on a pooled connection (read paths in [`ProductRepository`])
//! and inside an [`OrderTransaction`](crate::OrderTransaction).

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::Product;

/// Column list matching the `Product` FromRow mapping.
pub(crate) const PRODUCT_COLUMNS: &str = "id, name, description, category, barcode, \
     price_cents, tax_rate_bps, requires_deposit, deposit_cents, \
     stock_quantity, min_stock_level, is_active, created_at, updated_at";

// =============================================================================
// Statements
// =============================================================================

pub(crate) async fn fetch_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

pub(crate) async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, name = %product.name, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, description, category, barcode,
            price_cents, tax_rate_bps, requires_deposit, deposit_cents,
            stock_quantity, min_stock_level, is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.category)
    .bind(&product.barcode)
    .bind(product.price_cents)
    .bind(product.tax_rate_bps)
    .bind(product.requires_deposit)
    .bind(product.deposit_cents)
    .bind(product.stock_quantity)
    .bind(product.min_stock_level)
    .bind(product.is_active)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Overwrites every column of an existing product and bumps `updated_at`.
pub(crate) async fn update(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, "Updating product");

    let result = sqlx::query(
        r#"
        UPDATE products SET
            name = ?2,
            description = ?3,
            category = ?4,
            barcode = ?5,
            price_cents = ?6,
            tax_rate_bps = ?7,
            requires_deposit = ?8,
            deposit_cents = ?9,
            stock_quantity = ?10,
            min_stock_level = ?11,
            is_active = ?12,
            updated_at = ?13
        WHERE id = ?1
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.category)
    .bind(&product.barcode)
    .bind(product.price_cents)
    .bind(product.tax_rate_bps)
    .bind(product.requires_deposit)
    .bind(product.deposit_cents)
    .bind(product.stock_quantity)
    .bind(product.min_stock_level)
    .bind(product.is_active)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", &product.id));
    }

    Ok(())
}

/// Changes stock by a delta.
///
/// ## Delta Pattern
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────┐
/// │  ❌ read stock, compute, write back (lost update between two payers) │
/// │     UPDATE products SET stock_quantity = 98 WHERE id = ?            │
/// │                                                                     │
/// │  ✅ let SQLite apply the change under its write lock                 │
/// │     UPDATE products SET stock_quantity = stock_quantity - 2         │
/// └─────────────────────────────────────────────────────────────────────┘
/// ```
///
/// The result is never clamped; negative stock is kept as is.
pub(crate) async fn adjust_stock(conn: &mut SqliteConnection, id: &str, delta: i64) -> DbResult<i64> {
    debug!(id = %id, delta = %delta, "Adjusting stock");

    let new_stock: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET stock_quantity = stock_quantity + ?2,
            updated_at = ?3
        WHERE id = ?1
        RETURNING stock_quantity
        "#,
    )
    .bind(id)
    .bind(delta)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    new_stock.ok_or_else(|| DbError::not_found("Product", id))
}

/// Sets stock to an absolute count (manual stocktake).
pub(crate) async fn set_stock(conn: &mut SqliteConnection, id: &str, quantity: i64) -> DbResult<()> {
    let result = sqlx::query("UPDATE products SET stock_quantity = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

/// Whether another product already uses this barcode.
pub(crate) async fn barcode_taken(
    conn: &mut SqliteConnection,
    barcode: &str,
    exclude_id: Option<&str>,
) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products WHERE barcode = ?1 AND (?2 IS NULL OR id != ?2)",
    )
    .bind(barcode)
    .bind(exclude_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

/// Whether any order line or deposit return references this product.
pub(crate) async fn is_referenced(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM order_items WHERE product_id = ?1) \
              + (SELECT COUNT(*) FROM deposit_returns WHERE product_id = ?1)",
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

/// Hard delete. Fails with a foreign key violation if lines reference it.
pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting product");

    let result = sqlx::query("DELETE FROM products WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

/// Soft delete: the product stays for historical lines but can no longer be sold.
pub(crate) async fn deactivate(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Soft-deleting product");

    let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read-side access to products, plus plain inserts for seeding.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let hits = repo.search("cola", 20).await?;
/// let low = repo.low_stock().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut conn, id).await
    }

    /// Gets an active product by barcode (scanner lookup).
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE barcode = ?1 AND is_active = 1",
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(barcode.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Lists products ordered by category and name.
    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE (?1 OR is_active = 1) ORDER BY category, name",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Case-insensitive substring search over name, description and barcode.
    ///
    /// An empty query returns active products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();
        debug!(query = %query, limit = %limit, "Searching products");

        let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{}%", escaped);
        let sql = format!(
            r#"
            SELECT {} FROM products
            WHERE is_active = 1
              AND (name LIKE ?1 ESCAPE '\'
                   OR description LIKE ?1 ESCAPE '\'
                   OR barcode LIKE ?1 ESCAPE '\')
            ORDER BY name
            LIMIT ?2
            "#,
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Active products at or below their threshold, lowest stock first.
    pub async fn low_stock(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {} FROM products
            WHERE is_active = 1 AND min_stock_level > 0 AND stock_quantity <= min_stock_level
            ORDER BY stock_quantity, name
            "#,
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql).fetch_all(&self.pool).await?;
        Ok(products)
    }

    /// Inserts a product outside any order transaction (seeding, imports).
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, product).await
    }

    /// Counts active products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Σ price × stock over active products with positive stock, in cents.
    pub async fn inventory_value_cents(&self) -> DbResult<i64> {
        let value: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(price_cents * stock_quantity), 0) FROM products \
             WHERE is_active = 1 AND stock_quantity > 0",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(value)
    }
}

/// Generates a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
