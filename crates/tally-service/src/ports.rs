//! # Collaborator Seams
//!
//! The services never reach for a global: storage, audit and identity are
//! handed to them at construction.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  OrderLifecycleManager::new(store, audit, identity, settings)        │
//! │                               │      │        │                      │
//! │            ┌──────────────────┘      │        └─────────────┐        │
//! │            ▼                         ▼                      ▼        │
//! │  dyn OrderStore              dyn AuditSink         dyn IdentityProvider
//! │  ├── SqliteStore             ├── TracingAuditSink  └── StaticIdentity│
//! │  └── MemoryStore             └── RecordingAuditSink                  │
//! │       │                                                              │
//! │       └── begin() → Box<dyn StoreTransaction>   (all or nothing)     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use tally_core::{AuditAction, DepositReturn, Order, Product};

// =============================================================================
// Store Error
// =============================================================================

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row the operation needed does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A uniqueness rule rejected the write.
    #[error("Conflict on {field}: {value}")]
    Conflict { field: String, value: String },

    /// A referential or check rule rejected the write.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Another writer holds the lock or the pool is exhausted.
    #[error("Storage busy: {0}")]
    Busy(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Anything else from the backend.
    #[error("Storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy(_) | StoreError::Conflict { .. })
    }
}

// =============================================================================
// Store
// =============================================================================

/// Storage for orders, products and deposit returns.
///
/// Read methods see committed state only. Writes go through
/// [`begin`](OrderStore::begin).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Opens an atomic unit of work.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>>;

    async fn find_order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>>;

    /// Orders created in `[start, end)`, oldest first.
    async fn list_orders(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<Order>>;

    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>>;

    /// Active product with this barcode.
    async fn find_product_by_barcode(&self, barcode: &str) -> StoreResult<Option<Product>>;

    /// Products ordered by category, then name.
    async fn list_products(&self, include_inactive: bool) -> StoreResult<Vec<Product>>;

    /// Active products whose name, description or barcode contains `query`
    /// (case-insensitive), ordered by name.
    async fn search_products(&self, query: &str, limit: u32) -> StoreResult<Vec<Product>>;

    /// Active products at or below their minimum level, lowest stock first.
    async fn low_stock_products(&self) -> StoreResult<Vec<Product>>;

    /// Deposit returns booked in `[start, end)`, oldest first.
    async fn list_deposit_returns(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<DepositReturn>>;
}

/// One all-or-nothing unit of work.
///
/// Nothing is visible to readers until [`commit`](StoreTransaction::commit).
/// Dropping the transaction without committing discards every write.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn load_order(&mut self, id: &str) -> StoreResult<Option<Order>>;

    async fn save_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn order_number_exists(&mut self, order_number: &str) -> StoreResult<bool>;

    async fn load_product(&mut self, id: &str) -> StoreResult<Option<Product>>;

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;

    async fn save_product(&mut self, product: &Product) -> StoreResult<()>;

    /// Adds `delta` to the product's stock and returns the new level.
    /// The result may be negative.
    async fn adjust_stock(&mut self, product_id: &str, delta: i64) -> StoreResult<i64>;

    async fn set_stock(&mut self, product_id: &str, quantity: i64) -> StoreResult<()>;

    async fn barcode_taken(&mut self, barcode: &str, exclude_id: Option<&str>) -> StoreResult<bool>;

    /// Deletes the product if no line or deposit return references it,
    /// otherwise deactivates it. Returns `true` for a hard delete.
    async fn delete_product(&mut self, product_id: &str) -> StoreResult<bool>;

    /// Books a deposit return. The product must exist.
    async fn insert_deposit_return(&mut self, ret: &DepositReturn) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

// =============================================================================
// Audit
// =============================================================================

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub actor_id: i64,
    pub action: AuditAction,
    /// Order or product id the event is about.
    pub subject: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("Audit sink failed: {0}")]
pub struct AuditError(pub String);

/// Receives an event after each committed mutation.
///
/// A failing sink never fails the business operation; the caller only logs it.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

// =============================================================================
// Identity
// =============================================================================

/// Supplies the acting user id. The id is opaque to the services.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> i64;
}

/// A fixed user id (CLI flag, config, tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticIdentity(pub i64);

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(StoreError::Busy("locked".into()).is_transient());
        assert!(StoreError::Conflict {
            field: "orders.order_number".into(),
            value: "202406011234".into()
        }
        .is_transient());
        assert!(!StoreError::Backend("disk full".into()).is_transient());
        assert!(!StoreError::not_found("Order", "o-1").is_transient());
    }

    #[test]
    fn test_static_identity() {
        let identity: &dyn IdentityProvider = &StaticIdentity(42);
        assert_eq!(identity.current_user_id(), 42);
    }
}
