//! # Validation Module
//!
//! Input validation utilities for Tally POS.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Service call (tally-service)                                 │
//! │  └── quantities, amounts → OrderError::InvalidInput                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Aggregate / Product::validate (THIS MODULE)                  │
//! │  └── business rules on the data itself                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  └── NOT NULL, UNIQUE (order_number, barcode), FOREIGN KEY            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 200 characters
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Apfelschorle 0.5l").is_ok());
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a barcode: 1-100 characters, digits and letters only.
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if barcode.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: 100,
        });
    }

    if !barcode.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only letters and digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a search query. Empty is allowed; returns the trimmed query.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ```text
///  cashier types 5   → ok
///  cashier types 0   → "quantity must be positive"
///  cashier types 1000 → "quantity must be between 1 and 999"
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    Ok(())
}

/// Validates a non-negative amount such as a discount or a tendered amount.
pub fn validate_non_negative_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points: 0 to 10000 (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

/// Validates the deposit pair: an amount is present if and only if the
/// product requires a deposit, and that amount is not negative.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_deposit;
///
/// assert!(validate_deposit(true, Some(25)).is_ok());
/// assert!(validate_deposit(false, None).is_ok());
/// assert!(validate_deposit(true, None).is_err());
/// assert!(validate_deposit(false, Some(25)).is_err());
/// ```
pub fn validate_deposit(requires_deposit: bool, deposit_cents: Option<i64>) -> ValidationResult<()> {
    match (requires_deposit, deposit_cents) {
        (true, Some(cents)) if cents < 0 => Err(ValidationError::MustNotBeNegative {
            field: "deposit".to_string(),
        }),
        (true, Some(_)) | (false, None) => Ok(()),
        (true, None) => Err(ValidationError::Inconsistent {
            field: "deposit".to_string(),
            reason: "a deposit amount is required when the product requires a deposit".to_string(),
        }),
        (false, Some(_)) => Err(ValidationError::Inconsistent {
            field: "deposit".to_string(),
            reason: "a deposit amount is only allowed when the product requires a deposit"
                .to_string(),
        }),
    }
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a UUID string (used for order, line item and product ids).
pub fn validate_uuid(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(value).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
