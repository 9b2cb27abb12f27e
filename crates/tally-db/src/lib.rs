//! # tally-db: Database Layer for Tally POS
//!
//! SQLite storage for products, orders and deposit returns, using sqlx for
//! async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  OrderLifecycleManager (tally-service)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ product.rs    │    │  (embedded)  │  │   │
//! │  │   │               │    │ order.rs      │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ deposit.rs    │    │ 002_deposit_ │  │   │
//! │  │   │ begin() ──────┼───►│ OrderTransac- │    │   returns    │  │   │
//! │  │   │               │    │ tion          │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL)                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("tally.db")).await?;
//!
//! let hits = db.products().search("cola", 20).await?;
//!
//! let mut tx = db.begin().await?;
//! let order = tx.load_order(&id).await?;
//! tx.commit().await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod transaction;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use transaction::OrderTransaction;

pub use repository::deposit::DepositRepository;
pub use repository::order::OrderRepository;
pub use repository::product::{generate_product_id, ProductRepository};
