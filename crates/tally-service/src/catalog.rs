//! # Catalog Service
//!
//! Product maintenance: create, edit, stock counts and deletion.
//!
//! Every write runs in one store transaction, the same way order
//! operations do, and is audited after commit.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::lifecycle::{logged, require};
use crate::ports::{AuditEvent, AuditSink, IdentityProvider, OrderStore, StoreTransaction};
use tally_core::validation::validate_search_query;
use tally_core::{AuditAction, Product, ProductCategory, ValidationError, DEFAULT_TAX_RATE_BPS};

/// Default number of search results.
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// Upper bound on search results.
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Input for a new catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_category")]
    pub category: ProductCategory,
    #[serde(default)]
    pub barcode: Option<String>,
    pub price_cents: i64,
    /// Standard VAT when omitted.
    #[serde(default)]
    pub tax_rate_bps: Option<u32>,
    #[serde(default)]
    pub requires_deposit: bool,
    #[serde(default)]
    pub deposit_cents: Option<i64>,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub min_stock_level: i64,
}

fn default_category() -> ProductCategory {
    ProductCategory::Other
}

/// Partial edit of a catalog entry. `None` leaves a field unchanged.
///
/// `description` and `barcode` are double options: `Some(None)` clears the
/// value. `requires_deposit` and `deposit_cents` are checked together after
/// the edit is applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<ProductCategory>,
    pub barcode: Option<Option<String>>,
    pub price_cents: Option<i64>,
    pub tax_rate_bps: Option<u32>,
    pub requires_deposit: Option<bool>,
    pub deposit_cents: Option<Option<i64>>,
    pub min_stock_level: Option<i64>,
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            product.description = clean(description);
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(barcode) = self.barcode {
            product.barcode = clean(barcode);
        }
        if let Some(price) = self.price_cents {
            product.price_cents = price;
        }
        if let Some(bps) = self.tax_rate_bps {
            product.tax_rate_bps = bps;
        }
        if let Some(requires) = self.requires_deposit {
            product.requires_deposit = requires;
        }
        if let Some(deposit) = self.deposit_cents {
            product.deposit_cents = deposit;
        }
        if let Some(min) = self.min_stock_level {
            product.min_stock_level = min;
        }
        if let Some(active) = self.is_active {
            product.is_active = active;
        }
    }
}

/// What `delete_product` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The row is gone.
    Deleted,
    /// Order lines still reference it; it was deactivated instead.
    Deactivated,
}

/// Trims and drops empty strings.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Checks if a query looks like a barcode (8-13 digits).
fn is_barcode_query(query: &str) -> bool {
    (8..=13).contains(&query.len()) && query.chars().all(|c| c.is_ascii_digit())
}

pub struct CatalogService {
    store: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditSink>,
    identity: Arc<dyn IdentityProvider>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn OrderStore>, audit: Arc<dyn AuditSink>, identity: Arc<dyn IdentityProvider>) -> Self {
        CatalogService {
            store,
            audit,
            identity,
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_product(&self, product_id: &str) -> OrderResult<Product> {
        let result = async {
            require("product_id", product_id)?;
            self.store
                .get_product(product_id)
                .await?
                .ok_or_else(|| OrderError::not_found("Product", product_id))
        }
        .await;
        logged("get_product", result)
    }

    /// Products ordered by category, then name.
    pub async fn list_products(&self, include_inactive: bool) -> OrderResult<Vec<Product>> {
        let result = self.store.list_products(include_inactive).await.map_err(OrderError::from);
        logged("list_products", result)
    }

    /// Searches active products by name, description or barcode.
    ///
    /// A query that looks like a scanned barcode is tried as an exact lookup
    /// first; only if that misses does the text search run.
    pub async fn search_products(&self, query: &str, limit: Option<u32>) -> OrderResult<Vec<Product>> {
        let result = async {
            let query = validate_search_query(query)?;
            let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
            debug!(query = %query, limit, "Searching products");

            if is_barcode_query(&query) {
                if let Some(product) = self.store.find_product_by_barcode(&query).await? {
                    return Ok(vec![product]);
                }
                debug!(barcode = %query, "Barcode not found, falling back to text search");
            }

            let products = self.store.search_products(&query, limit).await?;
            debug!(count = products.len(), "Search complete");
            Ok::<_, OrderError>(products)
        }
        .await;
        logged("search_products", result)
    }

    /// Active products at or below their minimum stock level.
    pub async fn low_stock_products(&self) -> OrderResult<Vec<Product>> {
        let result = self.store.low_stock_products().await.map_err(OrderError::from);
        logged("low_stock_products", result)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    pub async fn create_product(&self, input: NewProduct) -> OrderResult<Product> {
        debug!(name = %input.name, "Creating product");

        let result = async {
            let now = Utc::now();
            let product = Product {
                id: Uuid::new_v4().to_string(),
                name: input.name.trim().to_string(),
                description: clean(input.description),
                category: input.category,
                barcode: clean(input.barcode),
                price_cents: input.price_cents,
                tax_rate_bps: input.tax_rate_bps.unwrap_or(DEFAULT_TAX_RATE_BPS),
                requires_deposit: input.requires_deposit,
                deposit_cents: input.deposit_cents,
                stock_quantity: input.stock_quantity,
                min_stock_level: input.min_stock_level,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            product.validate()?;

            let mut tx = self.store.begin().await?;
            ensure_barcode_free(tx.as_mut(), &product, None).await?;
            tx.insert_product(&product).await?;
            tx.commit().await?;
            Ok::<_, OrderError>(product)
        }
        .await;

        if let Ok(product) = &result {
            info!(product_id = %product.id, name = %product.name, "Product created");
            self.audit(AuditAction::ProductCreated, &product.id, format!("Product {} created", product.name))
                .await;
        }
        logged("create_product", result)
    }

    pub async fn update_product(&self, product_id: &str, update: ProductUpdate) -> OrderResult<Product> {
        debug!(product_id = %product_id, "Updating product");

        let result = async {
            require("product_id", product_id)?;

            let mut tx = self.store.begin().await?;
            let mut product = tx
                .load_product(product_id)
                .await?
                .ok_or_else(|| OrderError::not_found("Product", product_id))?;

            update.apply(&mut product);
            product.validate()?;
            ensure_barcode_free(tx.as_mut(), &product, Some(product_id)).await?;

            product.updated_at = Utc::now();
            tx.save_product(&product).await?;
            tx.commit().await?;
            Ok::<_, OrderError>(product)
        }
        .await;

        if let Ok(product) = &result {
            info!(product_id = %product.id, "Product updated");
            self.audit(AuditAction::ProductModified, &product.id, format!("Product {} updated", product.name))
                .await;
        }
        logged("update_product", result)
    }

    /// Overwrites the counted stock, e.g. after a stocktake.
    pub async fn set_stock(&self, product_id: &str, quantity: i64, reason: Option<String>) -> OrderResult<Product> {
        debug!(product_id = %product_id, quantity, "Setting stock");

        let result = async {
            require("product_id", product_id)?;
            if quantity < 0 {
                return Err(OrderError::InvalidInput(ValidationError::MustNotBeNegative {
                    field: "stock_quantity".to_string(),
                }));
            }

            let mut tx = self.store.begin().await?;
            let previous = tx
                .load_product(product_id)
                .await?
                .ok_or_else(|| OrderError::not_found("Product", product_id))?
                .stock_quantity;

            tx.set_stock(product_id, quantity).await?;
            // Read back so the caller sees the stored updated_at.
            let product = tx
                .load_product(product_id)
                .await?
                .ok_or_else(|| OrderError::not_found("Product", product_id))?;
            tx.commit().await?;
            Ok::<_, OrderError>((product, previous))
        }
        .await;

        let result = match result {
            Ok::<_, OrderError>((product, previous)) => {
                info!(product_id = %product.id, previous, quantity, "Stock set");
                let message = match reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                    Some(reason) => format!("Stock of {} set {} -> {}: {}", product.name, previous, quantity, reason),
                    None => format!("Stock of {} set {} -> {}", product.name, previous, quantity),
                };
                self.audit(AuditAction::StockAdjusted, &product.id, message).await;
                Ok(product)
            }
            Err(e) => Err(e),
        };
        logged("set_stock", result)
    }

    /// Removes a product, or deactivates it if any order line references it.
    pub async fn delete_product(&self, product_id: &str) -> OrderResult<DeleteOutcome> {
        debug!(product_id = %product_id, "Deleting product");

        let result = async {
            require("product_id", product_id)?;

            let mut tx = self.store.begin().await?;
            let product = tx
                .load_product(product_id)
                .await?
                .ok_or_else(|| OrderError::not_found("Product", product_id))?;

            let outcome = if tx.delete_product(product_id).await? {
                DeleteOutcome::Deleted
            } else {
                DeleteOutcome::Deactivated
            };
            tx.commit().await?;
            Ok::<_, OrderError>((product, outcome))
        }
        .await;

        let result = match result {
            Ok::<_, OrderError>((product, outcome)) => {
                info!(product_id = %product.id, outcome = ?outcome, "Product deleted");
                let message = match outcome {
                    DeleteOutcome::Deleted => format!("Product {} deleted", product.name),
                    DeleteOutcome::Deactivated => format!("Product {} deactivated, still referenced by orders", product.name),
                };
                self.audit(AuditAction::ProductDeleted, &product.id, message).await;
                Ok(outcome)
            }
            Err(e) => Err(e),
        };
        logged("delete_product", result)
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

async fn ensure_barcode_free(
    tx: &mut dyn StoreTransaction,
    product: &Product,
    exclude_id: Option<&str>,
) -> OrderResult<()> {
    if let Some(barcode) = &product.barcode {
        if tx.barcode_taken(barcode, exclude_id).await? {
            return Err(OrderError::InvalidInput(ValidationError::Duplicate {
                field: "barcode".to_string(),
                value: barcode.clone(),
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::RecordingAuditSink;
    use crate::error::ErrorCode;
    use crate::lifecycle::OrderLifecycleManager;
    use crate::memory::MemoryStore;
    use crate::ports::StaticIdentity;
    use crate::config::OrderSettings;
    use crate::sqlite::SqliteStore;
    use tally_core::{Money, PaymentMethod};
    use tally_db::{Database, DbConfig};

    fn cola() -> NewProduct {
        NewProduct {
            name: "  Cola 0.33l ".to_string(),
            description: Some("".to_string()),
            category: ProductCategory::Drinks,
            barcode: Some("4000000000017".to_string()),
            price_cents: 250,
            tax_rate_bps: None,
            requires_deposit: true,
            deposit_cents: Some(25),
            stock_quantity: 24,
            min_stock_level: 6,
        }
    }

    fn service(store: Arc<dyn OrderStore>, audit: &RecordingAuditSink) -> CatalogService {
        CatalogService::new(store, Arc::new(audit.clone()), Arc::new(StaticIdentity(2)))
    }

    #[tokio::test]
    async fn test_create_normalizes_and_audits() {
        let audit = RecordingAuditSink::new();
        let catalog = service(Arc::new(MemoryStore::new()), &audit);

        let product = catalog.create_product(cola()).await.unwrap();
        assert_eq!(product.name, "Cola 0.33l");
        assert_eq!(product.description, None);
        assert_eq!(product.tax_rate_bps, DEFAULT_TAX_RATE_BPS);
        assert!(product.is_active);

        assert_eq!(catalog.get_product(&product.id).await.unwrap(), product);

        let events = audit.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::ProductCreated);
        assert_eq!(events[0].actor_id, 2);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let audit = RecordingAuditSink::new();
        let catalog = service(Arc::new(MemoryStore::new()), &audit);

        let mut no_deposit = cola();
        no_deposit.deposit_cents = None;
        let mut negative_price = cola();
        negative_price.price_cents = -1;
        let mut bad_tax = cola();
        bad_tax.tax_rate_bps = Some(10_001);
        let mut blank = cola();
        blank.name = "   ".to_string();

        for input in [no_deposit, negative_price, bad_tax, blank] {
            let err = catalog.create_product(input).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidInput);
        }
        assert!(catalog.list_products(true).await.unwrap().is_empty());
        assert!(audit.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_barcode_must_be_unique() {
        let audit = RecordingAuditSink::new();
        let catalog = service(Arc::new(MemoryStore::new()), &audit);

        let first = catalog.create_product(cola()).await.unwrap();
        let err = catalog.create_product(cola()).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidInput(ValidationError::Duplicate { .. })));

        // Saving a product with its own barcode is fine
        let update = ProductUpdate {
            price_cents: Some(270),
            ..ProductUpdate::default()
        };
        let updated = catalog.update_product(&first.id, update).await.unwrap();
        assert_eq!(updated.price_cents, 270);
    }

    #[tokio::test]
    async fn test_update_fields() {
        let audit = RecordingAuditSink::new();
        let catalog = service(Arc::new(MemoryStore::new()), &audit);
        let product = catalog.create_product(cola()).await.unwrap();

        let update = ProductUpdate {
            name: Some("Cola Zero".to_string()),
            barcode: Some(None),
            requires_deposit: Some(false),
            deposit_cents: Some(None),
            ..ProductUpdate::default()
        };
        let updated = catalog.update_product(&product.id, update).await.unwrap();
        assert_eq!(updated.name, "Cola Zero");
        assert_eq!(updated.barcode, None);
        assert!(!updated.requires_deposit);

        // Turning the deposit back on without an amount is inconsistent
        let update = ProductUpdate {
            requires_deposit: Some(true),
            ..ProductUpdate::default()
        };
        let err = catalog.update_product(&product.id, update).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);

        let err = catalog
            .update_product("missing", ProductUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_search_and_low_stock() {
        let audit = RecordingAuditSink::new();
        let catalog = service(Arc::new(MemoryStore::new()), &audit);
        let cola = catalog.create_product(cola()).await.unwrap();
        catalog
            .create_product(NewProduct {
                name: "Pretzel".to_string(),
                description: Some("fresh from the oven".to_string()),
                category: ProductCategory::Food,
                barcode: None,
                price_cents: 180,
                tax_rate_bps: Some(700),
                requires_deposit: false,
                deposit_cents: None,
                stock_quantity: 50,
                min_stock_level: 10,
            })
            .await
            .unwrap();

        let hits = catalog.search_products("oven", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Pretzel");

        let hits = catalog.search_products("4000000000017", None).await.unwrap();
        assert_eq!(hits[0].id, cola.id);

        let err = catalog.search_products(&"x".repeat(101), None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);

        assert!(catalog.low_stock_products().await.unwrap().is_empty());
        let counted = catalog.set_stock(&cola.id, 6, Some("stocktake".into())).await.unwrap();
        assert_eq!(counted.stock_quantity, 6);

        let low = catalog.low_stock_products().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, cola.id);

        let err = catalog.set_stock(&cola.id, -1, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);

        let last = audit.events().await.pop().unwrap();
        assert_eq!(last.action, AuditAction::StockAdjusted);
        assert!(last.message.ends_with("24 -> 6: stocktake"));
    }

    #[tokio::test]
    async fn test_delete_soft_when_sold() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store: Arc<dyn OrderStore> = Arc::new(SqliteStore::new(db));
        let audit = RecordingAuditSink::new();
        let catalog = service(store.clone(), &audit);
        let orders = OrderLifecycleManager::new(
            store.clone(),
            Arc::new(audit.clone()),
            Arc::new(StaticIdentity(2)),
            OrderSettings::default(),
        );

        let sold = catalog.create_product(cola()).await.unwrap();
        let mut unsold = cola();
        unsold.barcode = None;
        let unsold = catalog.create_product(unsold).await.unwrap();

        let order = orders.create_order(2).await.unwrap();
        orders.add_item(order.id(), &sold.id, 1).await.unwrap();
        orders
            .process_payment(order.id(), PaymentMethod::Card, Money::from_cents(323))
            .await
            .unwrap();

        assert_eq!(catalog.delete_product(&sold.id).await.unwrap(), DeleteOutcome::Deactivated);
        assert_eq!(catalog.delete_product(&unsold.id).await.unwrap(), DeleteOutcome::Deleted);

        assert!(!catalog.get_product(&sold.id).await.unwrap().is_active);
        assert_eq!(catalog.get_product(&unsold.id).await.unwrap_err().code(), ErrorCode::NotFound);
        assert!(catalog.list_products(false).await.unwrap().is_empty());

        // The paid order still reads back with its snapshot line
        let stored = orders.get_order(order.id()).await.unwrap();
        assert_eq!(stored.items()[0].name_snapshot, "Cola 0.33l");
    }

    #[tokio::test]
    async fn test_set_stock_returns_stored_row() {
        for store in [
            Arc::new(MemoryStore::new()) as Arc<dyn OrderStore>,
            Arc::new(SqliteStore::new(Database::new(DbConfig::in_memory()).await.unwrap())),
        ] {
            let audit = RecordingAuditSink::new();
            let catalog = service(store, &audit);
            let created = catalog.create_product(cola()).await.unwrap();

            let counted = catalog.set_stock(&created.id, 12, None).await.unwrap();
            assert_eq!(counted.stock_quantity, 12);
            assert!(counted.updated_at >= created.updated_at);
            assert_eq!(catalog.get_product(&created.id).await.unwrap(), counted);
        }
    }
}
