//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core (this file)                                                │
//! │  ├── CoreError        - Order aggregate rule violations                │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db                                                              │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  tally-service                                                         │
//! │  ├── StoreError       - Opaque persistence failure                     │
//! │  └── OrderError       - What callers see (serialized, with code)       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → OrderError → CLI / UI             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::OrderStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised by the order aggregate.
///
/// The lifecycle manager translates every variant into its own result type;
/// none of these reach a UI directly.
#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    /// The order is not `Open`, so it cannot be mutated or transitioned.
    ///
    /// ## When This Occurs
    /// - Adding items to a paid order
    /// - Cancelling a paid order
    /// - Paying a cancelled order
    #[error("Order {order_id} is {status}, operation not allowed")]
    InvalidState { order_id: String, status: OrderStatus },

    /// No line item with this id exists on the order.
    #[error("Line item not found: {0}")]
    LineItemNotFound(String),

    /// The product is inactive and cannot be sold.
    #[error("Product is not available: {0}")]
    ProductUnavailable(String),

    /// The order already holds the maximum number of distinct lines.
    #[error("Order cannot have more than {max} lines")]
    TooManyLines { max: usize },

    /// A line's quantity would exceed the per-line maximum.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (bad amount, bad date, bad order number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two fields contradict each other (deposit without the deposit flag).
    #[error("{field}: {reason}")]
    Inconsistent { field: String, reason: String },

    /// Duplicate value (e.g., duplicate barcode).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
