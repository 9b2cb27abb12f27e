//! # Repository Module
//!
//! SQL for products, orders and deposit returns.
//!
//! ## Two Ways In
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Read paths                         Write paths                         │
//! │  ──────────                         ───────────                         │
//! │  db.products().search(..)           db.begin() → OrderTransaction       │
//! │  db.orders().list_in_range(..)          .load_order / .save_order       │
//! │       │                                 .adjust_stock / .commit         │
//! │       ▼                                      │                          │
//! │  pooled connection                   one sqlx::Transaction              │
//! │       │                                      │                          │
//! │       └──────────────┬───────────────────────┘                          │
//! │                      ▼                                                  │
//! │       shared statements on &mut SqliteConnection                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog lookups and search
//! - [`OrderRepository`](order::OrderRepository) - Order loading and range queries
//! - [`DepositRepository`](deposit::DepositRepository) - Deposit returns by date

pub mod deposit;
pub mod order;
pub mod product;
