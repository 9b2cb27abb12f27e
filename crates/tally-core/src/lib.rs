//! # tally-core: Pure Business Logic for Tally POS
//!
//! Order entry, pricing and reporting for small retail and event counters,
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 tally-cli / any UI front end                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   tally-service: OrderLifecycleManager, Catalog, Reports        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐ │   │
//! │  │   │  money   │ │ pricing  │ │  order   │ │    reporting     │ │   │
//! │  │   │  Money   │ │ Totals   │ │  Order   │ │ RevenueSummary   │ │   │
//! │  │   │ TaxRate  │ │ compute_ │ │ LineItem │ │ DailyStats       │ │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer `Money` and the high-precision tax accumulator
//! - [`types`] - Product, line item, status and payment enums
//! - [`pricing`] - Order totals from line items
//! - [`order`] - The order aggregate and its state machine
//! - [`order_number`] - `yyyyMMdd` + suffix order numbers
//! - [`reporting`] - Revenue, order-count and deposit folds
//! - [`error`] / [`validation`] - Domain errors and input rules
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use tally_core::{Money, Order, PaymentMethod, Product, ProductCategory};
//!
//! let now = Utc::now();
//! let lemonade = Product {
//!     id: "p-1".into(),
//!     name: "Lemonade".into(),
//!     description: None,
//!     category: ProductCategory::Drinks,
//!     barcode: None,
//!     price_cents: 350,
//!     tax_rate_bps: 1900,
//!     requires_deposit: false,
//!     deposit_cents: None,
//!     stock_quantity: 100,
//!     min_stock_level: 0,
//!     is_active: true,
//!     created_at: now,
//!     updated_at: now,
//! };
//!
//! let mut order = Order::new("o-1", "202406014711", 1, false);
//! order.add_line_item(&lemonade, 2).unwrap();
//! assert_eq!(order.totals().total.to_string(), "8.33");
//!
//! order.mark_paid(PaymentMethod::Cash, Money::from_cents(1000)).unwrap();
//! assert_eq!(order.change_amount().to_string(), "1.67");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod order;
pub mod order_number;
pub mod pricing;
pub mod reporting;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, PreciseMoney};
pub use order::{Order, PersistedOrder};
pub use pricing::{compute_totals, Totals};
pub use reporting::{
    CategoryDeposits, DailyDeposits, DailyStats, DepositStatistics, PaymentBreakdown, ReportRange,
    RevenueSummary,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single order.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity on a single line.
///
/// ## Business Reason
/// Catches typos at the counter (typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Standard VAT rate used when a product is created without one (19%).
pub const DEFAULT_TAX_RATE_BPS: u32 = 1900;
