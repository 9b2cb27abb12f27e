//! # Deposit Service
//!
//! Bottle and crate deposits. Deposits are collected on paid order lines
//! and paid back when empties come back over the counter.
//!
//! ## Balance
//! ```text
//!   collected  Σ deposit × qty over lines of paid orders
//! − returned   Σ deposit × qty over booked returns
//! ─────────────────────────────────────────────────────
//!   balance    may go negative (more empties back than sold here)
//! ```
//!
//! A return is a stored row, not just a log line, so the balance survives
//! restarts and shows up in reports.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::lifecycle::{logged, require};
use crate::ports::{AuditEvent, AuditSink, IdentityProvider, OrderStore};
use tally_core::reporting::deposit_statistics;
use tally_core::validation::validate_quantity;
use tally_core::{AuditAction, DepositReturn, DepositStatistics, Product, ReportRange, ValidationError};

pub struct DepositService {
    store: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditSink>,
    identity: Arc<dyn IdentityProvider>,
    include_test_orders: bool,
}

impl DepositService {
    /// `include_test_orders` comes from `reporting.include_test_orders`.
    pub fn new(
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditSink>,
        identity: Arc<dyn IdentityProvider>,
        include_test_orders: bool,
    ) -> Self {
        DepositService {
            store,
            audit,
            identity,
            include_test_orders,
        }
    }

    /// Books `quantity` empties of a deposit product as returned.
    ///
    /// Inactive products are accepted: delisted bottles still come back.
    pub async fn return_deposit(&self, product_id: &str, quantity: i64) -> OrderResult<DepositReturn> {
        debug!(product_id = %product_id, quantity, "Booking deposit return");

        let result = async {
            require("product_id", product_id)?;
            validate_quantity(quantity)?;

            let mut tx = self.store.begin().await?;
            let product = tx
                .load_product(product_id)
                .await?
                .ok_or_else(|| OrderError::not_found("Product", product_id))?;
            let deposit = product.deposit().ok_or_else(|| {
                OrderError::InvalidInput(ValidationError::Inconsistent {
                    field: "product_id".to_string(),
                    reason: format!("{} carries no deposit", product.name),
                })
            })?;

            let ret = DepositReturn {
                id: Uuid::new_v4().to_string(),
                product_id: product.id.clone(),
                name_snapshot: product.name.clone(),
                quantity,
                deposit_cents: deposit.cents(),
                returned_by: self.identity.current_user_id(),
                returned_at: Utc::now(),
            };
            tx.insert_deposit_return(&ret).await?;
            tx.commit().await?;
            Ok::<_, OrderError>(ret)
        }
        .await;

        if let Ok(ret) = &result {
            info!(
                product_id = %ret.product_id,
                quantity = ret.quantity,
                amount = %ret.amount(),
                "Deposit returned"
            );
            let message = format!(
                "Deposit returned: {} x {} = {}",
                ret.quantity,
                ret.name_snapshot,
                ret.amount()
            );
            self.audit(AuditAction::DepositReturned, &ret.product_id, message).await;
        }
        logged("return_deposit", result)
    }

    /// Active products that carry a deposit, by category then name.
    pub async fn products_with_deposit(&self) -> OrderResult<Vec<Product>> {
        let result = self.store.list_products(false).await.map(|products| {
            products
                .into_iter()
                .filter(|p| p.deposit().is_some())
                .collect::<Vec<_>>()
        });
        logged("products_with_deposit", result.map_err(OrderError::from))
    }

    /// Collected, returned and balance over a range, per day and per category.
    pub async fn statistics(&self, range: ReportRange) -> OrderResult<DepositStatistics> {
        let result = self.load(range).await;

        if let Ok(stats) = &result {
            info!(
                start = %range.start,
                end = %range.end,
                collected = %stats.collected,
                returned = %stats.returned,
                balance = %stats.balance,
                "Deposit statistics built"
            );
        }
        logged("deposit_statistics", result)
    }

    /// All-time statistics; `balance` is the outstanding deposit.
    pub async fn balance(&self) -> OrderResult<DepositStatistics> {
        let result = async {
            let end = Utc::now() + Duration::days(1);
            let range = ReportRange::new(DateTime::<Utc>::UNIX_EPOCH, end)?;
            self.load(range).await
        }
        .await;
        logged("deposit_balance", result)
    }

    async fn load(&self, range: ReportRange) -> OrderResult<DepositStatistics> {
        let range = range.with_test_orders(range.include_test_orders || self.include_test_orders);
        debug!(start = %range.start, end = %range.end, "Loading deposit movements");

        let orders = self.store.list_orders(range.start, range.end).await?;
        let returns = self.store.list_deposit_returns(range.start, range.end).await?;
        // Inactive products keep their category for old lines.
        let categories: HashMap<String, _> = self
            .store
            .list_products(true)
            .await?
            .into_iter()
            .map(|p| (p.id, p.category))
            .collect();

        Ok(deposit_statistics(&orders, &returns, &range, |id| {
            categories.get(id).copied()
        }))
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
