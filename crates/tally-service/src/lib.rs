//! # tally-service: Order Lifecycle, Catalog, Deposits and Reporting
//!
//! The transactional layer of Tally POS. Front ends talk to this crate;
//! it talks to storage only through the [`OrderStore`] port.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   PosConfig ──► Pos::open()                                             │
//! │                    │                                                    │
//! │     ┌──────────────┼────────────────┬────────────────┐                  │
//! │     ▼              ▼                ▼                ▼                  │
//! │  OrderLifecycle  CatalogService  DepositService  ReportService          │
//! │  Manager            │                │                │                 │
//! │     │               │                │                │                 │
//! │     └───────────────┴────────────────┴────────────────┘                 │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │      Arc<dyn OrderStore> (SqliteStore or MemoryStore)                   │
//! │                                                                         │
//! │   Writers also hold Arc<dyn AuditSink> and Arc<dyn IdentityProvider>.   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collaborators are passed in at construction. Nothing is looked up from
//! a global registry.
//!
//! ## Modules
//! - [`lifecycle`] - `OrderLifecycleManager`, one transaction per operation
//! - [`catalog`] - Product maintenance
//! - [`deposit`] - Deposit returns and deposit statistics
//! - [`reports`] - Revenue summaries over a time window
//! - [`ports`] - Store, audit and identity traits
//! - [`sqlite`] / [`memory`] - Store adapters
//! - [`audit`] - Tracing and recording audit sinks
//! - [`config`] - `PosConfig` (TOML + environment)
//! - [`error`] - `OrderError` and stable error codes

pub mod audit;
pub mod catalog;
pub mod config;
pub mod deposit;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod ports;
pub mod reports;
pub mod sqlite;

pub use audit::{RecordingAuditSink, TracingAuditSink};
pub use catalog::{CatalogService, DeleteOutcome, NewProduct, ProductUpdate};
pub use config::{ConfigError, PosConfig};
pub use deposit::DepositService;
pub use error::{ErrorCode, ErrorResponse, OrderError, OrderResult};
pub use lifecycle::{OrderLifecycleManager, RandomSuffix, SuffixSource};
pub use memory::MemoryStore;
pub use ports::{
    AuditEvent, AuditSink, IdentityProvider, OrderStore, StaticIdentity, StoreError, StoreTransaction,
};
pub use reports::{ReportService, SalesReport};
pub use sqlite::SqliteStore;

use std::sync::Arc;

use tally_db::Database;
use tracing::info;

/// The services over one SQLite database.
pub struct Pos {
    pub orders: OrderLifecycleManager,
    pub catalog: CatalogService,
    pub deposits: DepositService,
    pub reports: ReportService,
    db: Database,
}

impl Pos {
    /// Opens the configured database, runs migrations and wires the services.
    ///
    /// Audit events go to the `audit` tracing target. `user_id` overrides
    /// `orders.user_id` as the acting user.
    pub async fn open(config: &PosConfig, user_id: Option<i64>) -> Result<Self, StoreError> {
        let db_config = config.db_config();
        if !db_config.is_in_memory() {
            if let Some(dir) = db_config.database_path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        let db = Database::new(db_config).await?;
        info!(path = %config.database_path().display(), "Database opened");

        let store: Arc<dyn OrderStore> = Arc::new(SqliteStore::new(db.clone()));
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(StaticIdentity(user_id.unwrap_or(config.orders.user_id)));

        Ok(Pos {
            orders: OrderLifecycleManager::new(
                store.clone(),
                audit.clone(),
                identity.clone(),
                config.orders.clone(),
            ),
            catalog: CatalogService::new(store.clone(), audit.clone(), identity.clone()),
            deposits: DepositService::new(
                store.clone(),
                audit,
                identity,
                config.reporting.include_test_orders,
            ),
            reports: ReportService::new(store, config.reporting.include_test_orders),
            db,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tally_core::{Money, PaymentMethod, ProductCategory};

    #[tokio::test]
    async fn test_open_in_memory_and_sell() {
        let mut config = PosConfig::default();
        config.database.path = Some(PathBuf::from(tally_db::pool::IN_MEMORY_PATH));
        config.database.max_connections = 1;

        let pos = Pos::open(&config, Some(9)).await.unwrap();
        let product = pos
            .catalog
            .create_product(NewProduct {
                name: "Water".to_string(),
                description: None,
                category: ProductCategory::Drinks,
                barcode: None,
                price_cents: 100,
                tax_rate_bps: Some(1900),
                requires_deposit: false,
                deposit_cents: None,
                stock_quantity: 5,
                min_stock_level: 0,
            })
            .await
            .unwrap();

        let order = pos.orders.create_order(9).await.unwrap();
        pos.orders.add_item(order.id(), &product.id, 1).await.unwrap();
        let order = pos
            .orders
            .process_payment(order.id(), PaymentMethod::Cash, Money::from_cents(200))
            .await
            .unwrap();

        assert_eq!(order.change_amount(), Money::from_cents(81));
        assert_eq!(pos.catalog.get_product(&product.id).await.unwrap().stock_quantity, 4);
        assert!(pos.deposits.products_with_deposit().await.unwrap().is_empty());
        pos.close().await;
    }
}
