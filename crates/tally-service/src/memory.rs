//! # In-Memory Store
//!
//! [`OrderStore`] over plain maps, for tests and throwaway sessions.
//!
//! ## Transactions
//! ```text
//! begin()  ── takes the writer lock, clones the committed maps
//!   │
//!   ├── every write lands in the clone
//!   │
//! commit() ── swaps the clone in, releases the writer lock
//! drop     ── releases the writer lock, clone is discarded
//! ```
//!
//! Writers run one at a time; readers always see the last committed state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::ports::{OrderStore, StoreError, StoreResult, StoreTransaction};
use tally_core::{DepositReturn, Order, Product};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<String, Product>,
    orders: HashMap<String, Order>,
    /// Append-only, in booking order.
    deposit_returns: Vec<DepositReturn>,
}

impl MemoryState {
    fn order_by_number(&self, order_number: &str) -> Option<&Order> {
        self.orders.values().find(|o| o.order_number() == order_number)
    }

    fn barcode_owner(&self, barcode: &str) -> Option<&str> {
        self.products
            .values()
            .find(|p| p.barcode.as_deref() == Some(barcode))
            .map(|p| p.id.as_str())
    }

    fn is_referenced(&self, product_id: &str) -> bool {
        self.orders
            .values()
            .any(|o| o.items().iter().any(|i| i.product_id == product_id))
            || self.deposit_returns.iter().any(|r| r.product_id == product_id)
    }
}

/// Shared handle; clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds products directly, outside any transaction.
    pub async fn with_products(self, products: impl IntoIterator<Item = Product>) -> Self {
        {
            let mut state = self.state.write().await;
            for product in products {
                state.products.insert(product.id.clone(), product);
            }
        }
        self
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let guard = self.writer.clone().lock_owned().await;
        let working = self.state.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            target: self.state.clone(),
            working,
            _guard: guard,
        }))
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.state.read().await.orders.get(id).cloned())
    }

    async fn find_order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
        Ok(self.state.read().await.order_by_number(order_number.trim()).cloned())
    }

    async fn list_orders(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.created_at() >= start && o.created_at() < end)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.order_number().cmp(b.order_number()))
        });
        Ok(orders)
    }

    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.state.read().await.products.get(id).cloned())
    }

    async fn find_product_by_barcode(&self, barcode: &str) -> StoreResult<Option<Product>> {
        let barcode = barcode.trim();
        Ok(self
            .state
            .read()
            .await
            .products
            .values()
            .find(|p| p.is_active && p.barcode.as_deref() == Some(barcode))
            .cloned())
    }

    async fn list_products(&self, include_inactive: bool) -> StoreResult<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| include_inactive || p.is_active)
            .cloned()
            .collect();
        products.sort_by(|a, b| {
            a.category
                .as_str()
                .cmp(b.category.as_str())
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(products)
    }

    async fn search_products(&self, query: &str, limit: u32) -> StoreResult<Vec<Product>> {
        let needle = query.trim().to_lowercase();
        let hit = |field: Option<&str>| field.is_some_and(|f| f.to_lowercase().contains(&needle));

        let state = self.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.is_active)
            .filter(|p| {
                hit(Some(&p.name)) || hit(p.description.as_deref()) || hit(p.barcode.as_deref())
            })
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        products.truncate(limit as usize);
        Ok(products)
    }

    async fn low_stock_products(&self) -> StoreResult<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.is_active && p.is_low_stock())
            .cloned()
            .collect();
        products.sort_by(|a, b| {
            a.stock_quantity
                .cmp(&b.stock_quantity)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(products)
    }

    async fn list_deposit_returns(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<DepositReturn>> {
        let state = self.state.read().await;
        let mut returns: Vec<DepositReturn> = state
            .deposit_returns
            .iter()
            .filter(|r| r.returned_at >= start && r.returned_at < end)
            .cloned()
            .collect();
        returns.sort_by(|a, b| a.returned_at.cmp(&b.returned_at).then_with(|| a.id.cmp(&b.id)));
        Ok(returns)
    }
}

// =============================================================================
// Transaction
// =============================================================================

struct MemoryTransaction {
    target: Arc<RwLock<MemoryState>>,
    working: MemoryState,
    _guard: OwnedMutexGuard<()>,
}

impl MemoryTransaction {
    fn product_mut(&mut self, id: &str) -> StoreResult<&mut Product> {
        self.working
            .products
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("Product", id))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn load_order(&mut self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(id).cloned())
    }

    async fn save_order(&mut self, order: &Order) -> StoreResult<()> {
        if let Some(other) = self.working.order_by_number(order.order_number()) {
            if other.id() != order.id() {
                return Err(StoreError::Conflict {
                    field: "orders.order_number".to_string(),
                    value: order.order_number().to_string(),
                });
            }
        }
        for item in order.items() {
            if !self.working.products.contains_key(&item.product_id) {
                return Err(StoreError::Constraint(format!(
                    "line {} references unknown product {}",
                    item.id, item.product_id
                )));
            }
        }
        self.working.orders.insert(order.id().to_string(), order.clone());
        Ok(())
    }

    async fn order_number_exists(&mut self, order_number: &str) -> StoreResult<bool> {
        Ok(self.working.order_by_number(order_number).is_some())
    }

    async fn load_product(&mut self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(id).cloned())
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        if self.working.products.contains_key(&product.id) {
            return Err(StoreError::Conflict {
                field: "products.id".to_string(),
                value: product.id.clone(),
            });
        }
        if let Some(barcode) = &product.barcode {
            if self.working.barcode_owner(barcode).is_some() {
                return Err(StoreError::Conflict {
                    field: "products.barcode".to_string(),
                    value: barcode.clone(),
                });
            }
        }
        self.working.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn save_product(&mut self, product: &Product) -> StoreResult<()> {
        if let Some(barcode) = &product.barcode {
            if let Some(owner) = self.working.barcode_owner(barcode) {
                if owner != product.id {
                    return Err(StoreError::Conflict {
                        field: "products.barcode".to_string(),
                        value: barcode.clone(),
                    });
                }
            }
        }
        let stored = self.product_mut(&product.id)?;
        *stored = product.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn adjust_stock(&mut self, product_id: &str, delta: i64) -> StoreResult<i64> {
        let product = self.product_mut(product_id)?;
        product.stock_quantity += delta;
        product.updated_at = Utc::now();
        Ok(product.stock_quantity)
    }

    async fn set_stock(&mut self, product_id: &str, quantity: i64) -> StoreResult<()> {
        let product = self.product_mut(product_id)?;
        product.stock_quantity = quantity;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn barcode_taken(&mut self, barcode: &str, exclude_id: Option<&str>) -> StoreResult<bool> {
        Ok(match self.working.barcode_owner(barcode) {
            Some(owner) => Some(owner) != exclude_id,
            None => false,
        })
    }

    async fn delete_product(&mut self, product_id: &str) -> StoreResult<bool> {
        if self.working.is_referenced(product_id) {
            let product = self.product_mut(product_id)?;
            product.is_active = false;
            product.updated_at = Utc::now();
            Ok(false)
        } else {
            self.working
                .products
                .remove(product_id)
                .map(|_| true)
                .ok_or_else(|| StoreError::not_found("Product", product_id))
        }
    }

    async fn insert_deposit_return(&mut self, ret: &DepositReturn) -> StoreResult<()> {
        if !self.working.products.contains_key(&ret.product_id) {
            return Err(StoreError::Constraint(format!(
                "deposit return {} references unknown product {}",
                ret.id, ret.product_id
            )));
        }
        self.working.deposit_returns.push(ret.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            target,
            working,
            _guard,
        } = *self;
        *target.write().await = working;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
