//! # Service Error Types
//!
//! What callers of the order, catalog and report services see.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ValidationError ──┐                                                    │
//! │                    ├──► CoreError ──┐                                   │
//! │  aggregate rules ──┘                │                                   │
//! │                                     ├──► OrderError ──► ErrorResponse   │
//! │  DbError ──► StoreError ────────────┘        │          { code,        │
//! │                                              │            message }     │
//! │                                              ▼                          │
//! │                                        ErrorCode (stable)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Store errors that mean "row missing" become `NotFound`; everything else
//! from storage is a `PersistenceFailure` with the cause attached.

use serde::Serialize;
use thiserror::Error;

use crate::ports::StoreError;
use tally_core::{CoreError, OrderStatus, ValidationError};

/// Result type for service operations.
pub type OrderResult<T> = Result<T, OrderError>;

/// Failure of a service operation.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order, product or line item is missing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The order is not `Open`.
    #[error("Order {order_id} is {status}, operation not allowed")]
    InvalidState { order_id: String, status: OrderStatus },

    /// The product is inactive.
    #[error("Product is not available: {0}")]
    ProductUnavailable(String),

    /// No free order number was found within the retry budget.
    #[error("No free order number after {attempts} attempts")]
    OrderNumberExhausted { attempts: u32 },

    /// The storage collaborator failed; nothing was committed.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[source] StoreError),

    /// Rejected before any storage work.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
}

/// Machine-readable error codes.
///
/// ## Usage in a Front End
/// ```typescript
/// switch (e.code) {
///   case 'INVALID_STATE':       refreshOrder(); break;
///   case 'PERSISTENCE_FAILURE': offerRetry();   break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InvalidState,
    ProductUnavailable,
    OrderNumberExhausted,
    PersistenceFailure,
    InvalidInput,
}

impl OrderError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        OrderError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            OrderError::NotFound { .. } => ErrorCode::NotFound,
            OrderError::InvalidState { .. } => ErrorCode::InvalidState,
            OrderError::ProductUnavailable(_) => ErrorCode::ProductUnavailable,
            OrderError::OrderNumberExhausted { .. } => ErrorCode::OrderNumberExhausted,
            OrderError::PersistenceFailure(_) => ErrorCode::PersistenceFailure,
            OrderError::InvalidInput(_) => ErrorCode::InvalidInput,
        }
    }

    /// Whether the same call may succeed if simply repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrderError::PersistenceFailure(e) => e.is_transient(),
            OrderError::OrderNumberExhausted { .. } => true,
            _ => false,
        }
    }
}

/// Converts aggregate rule violations.
///
/// ## Mapping
/// ```text
/// CoreError::InvalidState        → OrderError::InvalidState
/// CoreError::LineItemNotFound    → OrderError::NotFound
/// CoreError::ProductUnavailable  → OrderError::ProductUnavailable
/// CoreError::TooManyLines        → OrderError::InvalidInput
/// CoreError::QuantityTooLarge    → OrderError::InvalidInput
/// CoreError::Validation          → OrderError::InvalidInput
/// ```
impl From<CoreError> for OrderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidState { order_id, status } => OrderError::InvalidState { order_id, status },
            CoreError::LineItemNotFound(id) => OrderError::not_found("Line item", id),
            CoreError::ProductUnavailable(id) => OrderError::ProductUnavailable(id),
            CoreError::TooManyLines { max } => OrderError::InvalidInput(ValidationError::OutOfRange {
                field: "lines".to_string(),
                min: 0,
                max: max as i64,
            }),
            CoreError::QuantityTooLarge { max, .. } => OrderError::InvalidInput(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 1,
                max,
            }),
            CoreError::Validation(e) => OrderError::InvalidInput(e),
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => OrderError::NotFound { entity, id },
            other => OrderError::PersistenceFailure(other),
        }
    }
}

/// Serializable error body for front ends.
///
/// ```json
/// { "code": "INVALID_STATE", "message": "Order 2c9f… is paid, operation not allowed" }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl From<&OrderError> for ErrorResponse {
    fn from(err: &OrderError) -> Self {
        let message = match err {
            // Storage details stay in the log
            OrderError::PersistenceFailure(cause) => {
                tracing::error!(error = %cause, "Persistence failure");
                "The operation could not be saved; nothing was changed".to_string()
            }
            other => other.to_string(),
        };
        ErrorResponse {
            code: err.code(),
            message,
            retryable: err.is_retryable(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
