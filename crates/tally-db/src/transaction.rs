//! # Order Transaction
//!
//! The unit of work every state-changing operation runs in.
//!
//! ```text
//! let mut tx = db.begin().await?;
//! let mut order = tx.load_order(id).await?;      ─┐
//! order.mark_paid(..)?;                             │ one SQLite transaction
//! tx.save_order(&order).await?;                     │ all or nothing
//! tx.adjust_stock(product, -2).await?;             ─┘
//! tx.commit().await?;
//! ```
//!
//! Dropping an `OrderTransaction` without calling `commit()` rolls it back.

use sqlx::{Sqlite, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{deposit, order, product};
use tally_core::{DepositReturn, Order, Product};

pub struct OrderTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl OrderTransaction {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        OrderTransaction { tx }
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    pub async fn load_order(&mut self, id: &str) -> DbResult<Option<Order>> {
        order::fetch_by_id(&mut self.tx, id).await
    }

    pub async fn save_order(&mut self, order: &Order) -> DbResult<()> {
        order::save(&mut self.tx, order).await
    }

    pub async fn order_number_exists(&mut self, order_number: &str) -> DbResult<bool> {
        order::order_number_exists(&mut self.tx, order_number).await
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    pub async fn load_product(&mut self, id: &str) -> DbResult<Option<Product>> {
        product::fetch_by_id(&mut self.tx, id).await
    }

    pub async fn insert_product(&mut self, product: &Product) -> DbResult<()> {
        product::insert(&mut self.tx, product).await
    }

    pub async fn save_product(&mut self, product: &Product) -> DbResult<()> {
        product::update(&mut self.tx, product).await
    }

    /// Applies a stock delta; returns the new stock level.
    pub async fn adjust_stock(&mut self, product_id: &str, delta: i64) -> DbResult<i64> {
        product::adjust_stock(&mut self.tx, product_id, delta).await
    }

    pub async fn set_stock(&mut self, product_id: &str, quantity: i64) -> DbResult<()> {
        product::set_stock(&mut self.tx, product_id, quantity).await
    }

    pub async fn barcode_taken(&mut self, barcode: &str, exclude_id: Option<&str>) -> DbResult<bool> {
        product::barcode_taken(&mut self.tx, barcode, exclude_id).await
    }

    /// Removes a product: hard delete when no order line or deposit return
    /// references it, otherwise deactivation. Returns `true` for a hard delete.
    pub async fn delete_product(&mut self, product_id: &str) -> DbResult<bool> {
        if product::is_referenced(&mut self.tx, product_id).await? {
            product::deactivate(&mut self.tx, product_id).await?;
            Ok(false)
        } else {
            product::delete(&mut self.tx, product_id).await?;
            Ok(true)
        }
    }

    // -------------------------------------------------------------------------
    // Deposit Returns
    // -------------------------------------------------------------------------

    pub async fn insert_deposit_return(&mut self, ret: &DepositReturn) -> DbResult<()> {
        deposit::insert(&mut self.tx, ret).await
    }

    // -------------------------------------------------------------------------
    // Completion
    // -------------------------------------------------------------------------

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await.map_err(DbError::from)?;
        debug!("Transaction committed");
        Ok(())
    }
}

impl std::fmt::Debug for OrderTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderTransaction").finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
