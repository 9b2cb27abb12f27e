//! # Order Numbers
//!
//! Human-readable order numbers: the UTC creation date followed by a
//! four-digit suffix.
//!
//! ```text
//!   2024-06-01, suffix 4711  →  "202406014711"
//!   └──yyyyMMdd──┘└suffix┘
//! ```
//!
//! Uniqueness is not guaranteed by construction; the lifecycle manager
//! checks the store and retries with a fresh suffix.

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

/// Smallest suffix; keeps the suffix at exactly four digits.
pub const SUFFIX_MIN: u16 = 1000;

/// Largest suffix.
pub const SUFFIX_MAX: u16 = 9999;

/// Length of a well-formed order number.
pub const ORDER_NUMBER_LEN: usize = 12;

/// Formats an order number from a date and a suffix in `SUFFIX_MIN..=SUFFIX_MAX`.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use tally_core::order_number::format_order_number;
///
/// let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
/// assert_eq!(format_order_number(date, 4711), "202406014711");
/// ```
pub fn format_order_number(date: NaiveDate, suffix: u16) -> String {
    format!("{}{:04}", date.format("%Y%m%d"), suffix)
}

/// Splits an order number into its date and suffix.
pub fn parse_order_number(number: &str) -> ValidationResult<(NaiveDate, u16)> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "order_number".to_string(),
        reason: reason.to_string(),
    };

    let number = number.trim();
    if number.len() != ORDER_NUMBER_LEN || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("expected 12 digits (yyyyMMdd + 4-digit suffix)"));
    }

    let (date_part, suffix_part) = number.split_at(8);
    let date = NaiveDate::parse_from_str(date_part, "%Y%m%d").map_err(|_| invalid("invalid date"))?;
    let suffix: u16 = suffix_part.parse().map_err(|_| invalid("invalid suffix"))?;
    if suffix < SUFFIX_MIN {
        return Err(invalid("suffix must have four significant digits"));
    }

    Ok((date, suffix))
}
