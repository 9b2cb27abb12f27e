//! # SQLite Store
//!
//! [`OrderStore`] backed by `tally-db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ports::{OrderStore, StoreError, StoreResult, StoreTransaction};
use tally_core::{DepositReturn, Order, Product};
use tally_db::{Database, DbError, OrderTransaction};

/// Converts database errors to store errors.
///
/// ## Mapping
/// ```text
/// DbError::NotFound              → StoreError::NotFound
/// DbError::UniqueViolation       → StoreError::Conflict
/// DbError::ForeignKey / Check    → StoreError::Constraint
/// DbError::Busy / PoolExhausted  → StoreError::Busy
/// DbError::ConnectionFailed      → StoreError::Unavailable
/// Other                          → StoreError::Backend
/// ```
impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StoreError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => StoreError::Conflict { field, value },
            DbError::ForeignKeyViolation { message } => StoreError::Constraint(message),
            DbError::CheckViolation(message) => StoreError::Constraint(message),
            DbError::Busy(message) => StoreError::Busy(message),
            DbError::PoolExhausted => StoreError::Busy("connection pool exhausted".to_string()),
            DbError::ConnectionFailed(message) => StoreError::Unavailable(message),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(tx))
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.db.orders().get_by_id(id).await?)
    }

    async fn find_order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
        Ok(self.db.orders().get_by_order_number(order_number).await?)
    }

    async fn list_orders(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        Ok(self.db.orders().list_in_range(start, end).await?)
    }

    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.db.products().get_by_id(id).await?)
    }

    async fn find_product_by_barcode(&self, barcode: &str) -> StoreResult<Option<Product>> {
        Ok(self.db.products().get_by_barcode(barcode).await?)
    }

    async fn list_products(&self, include_inactive: bool) -> StoreResult<Vec<Product>> {
        Ok(self.db.products().list(include_inactive).await?)
    }

    async fn search_products(&self, query: &str, limit: u32) -> StoreResult<Vec<Product>> {
        Ok(self.db.products().search(query, limit).await?)
    }

    async fn low_stock_products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.db.products().low_stock().await?)
    }

    async fn list_deposit_returns(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<DepositReturn>> {
        Ok(self.db.deposits().list_in_range(start, end).await?)
    }
}

#[async_trait]
impl StoreTransaction for OrderTransaction {
    async fn load_order(&mut self, id: &str) -> StoreResult<Option<Order>> {
        Ok(OrderTransaction::load_order(self, id).await?)
    }

    async fn save_order(&mut self, order: &Order) -> StoreResult<()> {
        Ok(OrderTransaction::save_order(self, order).await?)
    }

    async fn order_number_exists(&mut self, order_number: &str) -> StoreResult<bool> {
        Ok(OrderTransaction::order_number_exists(self, order_number).await?)
    }

    async fn load_product(&mut self, id: &str) -> StoreResult<Option<Product>> {
        Ok(OrderTransaction::load_product(self, id).await?)
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        Ok(OrderTransaction::insert_product(self, product).await?)
    }

    async fn save_product(&mut self, product: &Product) -> StoreResult<()> {
        Ok(OrderTransaction::save_product(self, product).await?)
    }

    async fn adjust_stock(&mut self, product_id: &str, delta: i64) -> StoreResult<i64> {
        Ok(OrderTransaction::adjust_stock(self, product_id, delta).await?)
    }

    async fn set_stock(&mut self, product_id: &str, quantity: i64) -> StoreResult<()> {
        Ok(OrderTransaction::set_stock(self, product_id, quantity).await?)
    }

    async fn barcode_taken(&mut self, barcode: &str, exclude_id: Option<&str>) -> StoreResult<bool> {
        Ok(OrderTransaction::barcode_taken(self, barcode, exclude_id).await?)
    }

    async fn delete_product(&mut self, product_id: &str) -> StoreResult<bool> {
        Ok(OrderTransaction::delete_product(self, product_id).await?)
    }

    async fn insert_deposit_return(&mut self, ret: &DepositReturn) -> StoreResult<()> {
        Ok(OrderTransaction::insert_deposit_return(self, ret).await?)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        Ok(OrderTransaction::commit(*self).await?)
    }
}
