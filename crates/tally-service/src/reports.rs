//! # Report Service
//!
//! Loads the orders of a time window once and folds them with the pure
//! reporting functions from `tally-core`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{OrderError, OrderResult};
use crate::lifecycle::logged;
use crate::ports::OrderStore;
use tally_core::reporting::{daily_series, payment_breakdown, summarize};
use tally_core::{DailyStats, Order, PaymentBreakdown, ReportRange, RevenueSummary};

/// Everything the end-of-day screen shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesReport {
    pub range: ReportRange,
    pub summary: RevenueSummary,
    pub daily: Vec<DailyStats>,
    pub payments: Vec<PaymentBreakdown>,
}

pub struct ReportService {
    store: Arc<dyn OrderStore>,
    include_test_orders: bool,
}

impl ReportService {
    /// `include_test_orders` comes from `reporting.include_test_orders` and
    /// widens every range passed in.
    pub fn new(store: Arc<dyn OrderStore>, include_test_orders: bool) -> Self {
        ReportService {
            store,
            include_test_orders,
        }
    }

    pub async fn summary(&self, range: ReportRange) -> OrderResult<RevenueSummary> {
        let result = self.load(range).await.map(|(range, orders)| summarize(&orders, &range));
        logged("summary", result)
    }

    pub async fn daily_series(&self, range: ReportRange) -> OrderResult<Vec<DailyStats>> {
        let result = self.load(range).await.map(|(range, orders)| daily_series(&orders, &range));
        logged("daily_series", result)
    }

    pub async fn payment_breakdown(&self, range: ReportRange) -> OrderResult<Vec<PaymentBreakdown>> {
        let result = self
            .load(range)
            .await
            .map(|(range, orders)| payment_breakdown(&orders, &range));
        logged("payment_breakdown", result)
    }

    /// Summary, daily series and payment breakdown from a single read.
    pub async fn sales_report(&self, range: ReportRange) -> OrderResult<SalesReport> {
        let result = self.load(range).await.map(|(range, orders)| SalesReport {
            range,
            summary: summarize(&orders, &range),
            daily: daily_series(&orders, &range),
            payments: payment_breakdown(&orders, &range),
        });

        if let Ok(report) = &result {
            info!(
                start = %report.range.start,
                end = %report.range.end,
                orders = report.summary.order_count,
                revenue = %report.summary.revenue,
                "Sales report built"
            );
        }
        logged("sales_report", result)
    }

    async fn load(&self, range: ReportRange) -> Result<(ReportRange, Vec<Order>), OrderError> {
        let range = range.with_test_orders(range.include_test_orders || self.include_test_orders);
        debug!(
            start = %range.start,
            end = %range.end,
            include_test_orders = range.include_test_orders,
            "Loading orders for report"
        );

        let orders = self.store.list_orders(range.start, range.end).await?;
        Ok((range, orders))
    }
}
