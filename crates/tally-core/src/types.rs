//! # Domain Types
//!
//! Core domain types used throughout Tally POS.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    LineItem     │   │     Order       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │   (order.rs)    │       │
//! │  │  id (UUID)      │◄──│  product_id     │──►│  id (UUID)      │       │
//! │  │  price_cents    │   │  unit_price ❄   │   │  order_number   │       │
//! │  │  tax_rate_bps   │   │  tax_rate ❄     │   │  status         │       │
//! │  │  deposit_cents  │   │  deposit ❄      │   │  totals         │       │
//! │  │  stock_quantity │   │  stock_applied  │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ❄ = snapshot captured when the line is added, never re-read           │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │  OrderStatus    │   │ PaymentMethod   │       │
//! │  │  bps (u32)      │   │  Open           │   │  Cash           │       │
//! │  │  1900 = 19%     │   │  Paid           │   │  Card           │       │
//! │  └─────────────────┘   │  Cancelled      │   │  Voucher        │       │
//! │                        │  PartiallyCanc. │   │  Other          │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Line items reference products by id only. There are no back-pointers
//! from products to the lines that sold them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, PreciseMoney};
use crate::validation::{
    validate_barcode, validate_deposit, validate_price_cents, validate_product_name,
    validate_tax_rate_bps, ValidationResult,
};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so a rate with two decimals (19.00 %) is an
/// exact integer (1900 bps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

/// Shows the rate as a percentage with two decimals: `"19.00"`.
impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Parses a percentage such as `"19"`, `"7.5"` or `"19.00"`.
impl FromStr for TaxRate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A percentage has the same shape as an amount: two decimals at most.
        let as_hundredths: Money = s.parse().map_err(|_| ValidationError::InvalidFormat {
            field: "tax_rate".to_string(),
            reason: "expected a percentage like 19 or 7.5".to_string(),
        })?;
        let bps = u32::try_from(as_hundredths.cents()).map_err(|_| ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10_000,
        })?;
        validate_tax_rate_bps(bps)?;
        Ok(TaxRate(bps))
    }
}

// =============================================================================
// Product
// =============================================================================

/// Catalog grouping, used for display, deposit statistics and the seed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Drinks,
    Food,
    /// Deposit returns and empties.
    Deposit,
    Other,
}

impl Default for ProductCategory {
    fn default() -> Self {
        ProductCategory::Other
    }
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 4] = [
        ProductCategory::Drinks,
        ProductCategory::Food,
        ProductCategory::Deposit,
        ProductCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Drinks => "drinks",
            ProductCategory::Food => "food",
            ProductCategory::Deposit => "deposit",
            ProductCategory::Other => "other",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ProductCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "category".to_string(),
                allowed: ProductCategory::ALL.iter().map(|c| c.as_str().to_string()).collect(),
            })
    }
}

/// A product available for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    pub description: Option<String>,

    pub category: ProductCategory,

    /// Barcode (EAN-13 etc.). Unique when present.
    pub barcode: Option<String>,

    /// Net unit price in cents.
    pub price_cents: i64,

    /// Tax rate in basis points (1900 = 19%).
    pub tax_rate_bps: u32,

    /// Whether a deposit (Pfand) is charged per unit.
    pub requires_deposit: bool,

    /// Deposit per unit in cents. Present if and only if `requires_deposit`.
    pub deposit_cents: Option<i64>,

    /// Current stock level. May go negative: sales are never blocked on it.
    pub stock_quantity: i64,

    /// Low-stock threshold; 0 disables the warning.
    pub min_stock_level: i64,

    /// Inactive products cannot be added to orders (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// The deposit charged per unit, if this product carries one.
    pub fn deposit(&self) -> Option<Money> {
        if self.requires_deposit {
            self.deposit_cents.map(Money::from_cents)
        } else {
            None
        }
    }

    pub fn is_low_stock(&self) -> bool {
        self.min_stock_level > 0 && self.stock_quantity <= self.min_stock_level
    }

    /// Checks every field rule a catalog entry must satisfy.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_product_name(&self.name)?;
        validate_price_cents(self.price_cents)?;
        validate_tax_rate_bps(self.tax_rate_bps)?;
        validate_deposit(self.requires_deposit, self.deposit_cents)?;
        if let Some(barcode) = &self.barcode {
            validate_barcode(barcode)?;
        }
        if self.min_stock_level < 0 {
            return Err(ValidationError::OutOfRange {
                field: "min_stock_level".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The lifecycle status of an order.
///
/// ```text
///            ┌──► Paid
///   Open ────┼──► Cancelled
///            └──► PartiallyCancelled   (reserved, no operation produces it)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Items are being added; the only mutable state.
    Open,
    /// Paid and frozen.
    Paid,
    /// Cancelled before payment and frozen.
    Cancelled,
    /// Reserved for partial refunds.
    PartiallyCancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::PartiallyCancelled => "partially_cancelled",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Open
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    /// Card payment on an external terminal.
    Card,
    Voucher,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Voucher,
        PaymentMethod::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Voucher => "voucher",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                allowed: PaymentMethod::ALL.iter().map(|m| m.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// One product-quantity entry within an order.
///
/// Uses the snapshot pattern: name, price, tax rate and deposit are frozen
/// when the line is created. Later catalog edits never reach existing lines.
///
/// All derived amounts are computed, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LineItem {
    pub id: String,
    pub order_id: String,
    /// Lookup reference only; deleting a product never cascades here.
    pub product_id: String,
    /// Product name at time of adding (frozen).
    pub name_snapshot: String,
    pub quantity: i64,
    /// Net unit price in cents at time of adding (frozen).
    pub unit_price_cents: i64,
    /// Tax rate at time of adding (frozen).
    pub tax_rate_bps: u32,
    /// Deposit per unit at time of adding (frozen).
    pub deposit_cents: Option<i64>,
    /// Discount per unit.
    pub discount_cents: i64,
    /// Units actually taken out of catalog stock for this line.
    pub stock_applied: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// quantity × unit price
    pub fn subtotal(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }

    /// quantity × unit price × rate, unrounded.
    pub fn precise_tax(&self) -> PreciseMoney {
        self.subtotal().precise_tax(self.tax_rate())
    }

    /// Line tax rounded for display. Order totals never sum these.
    pub fn tax(&self) -> Money {
        self.precise_tax().round_to_money()
    }

    pub fn deposit_total(&self) -> Money {
        Money::from_cents(self.deposit_cents.unwrap_or(0)).multiply_quantity(self.quantity)
    }

    pub fn discount_total(&self) -> Money {
        Money::from_cents(self.discount_cents).multiply_quantity(self.quantity)
    }

    /// subtotal + tax + deposit − discount, for receipts.
    pub fn total(&self) -> Money {
        self.subtotal() + self.tax() + self.deposit_total() - self.discount_total()
    }
}

// =============================================================================
// Stock Adjustment
// =============================================================================

/// A stock change produced by an order transition, applied as a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustment {
    pub product_id: String,
    /// Negative on payment, positive on restoration.
    pub delta: i64,
}

// =============================================================================
// Deposit Return
// =============================================================================

/// Empties handed back at the counter and the deposit paid out for them.
///
/// Like a line item, the product name and the per-unit deposit are frozen
/// when the return is booked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DepositReturn {
    pub id: String,
    pub product_id: String,
    pub name_snapshot: String,
    pub quantity: i64,
    /// Deposit per unit at the time of the return (frozen).
    pub deposit_cents: i64,
    /// Acting user that booked the return.
    pub returned_by: i64,
    #[ts(as = "String")]
    pub returned_at: DateTime<Utc>,
}

impl DepositReturn {
    /// quantity × deposit, the amount paid out.
    pub fn amount(&self) -> Money {
        Money::from_cents(self.deposit_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Kinds of events handed to the audit sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    OrderCreated,
    OrderItemAdded,
    OrderItemRemoved,
    OrderModified,
    OrderPaid,
    OrderCancelled,
    ProductCreated,
    ProductModified,
    ProductDeleted,
    StockAdjusted,
    DepositReturned,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::OrderCreated => "order_created",
            AuditAction::OrderItemAdded => "order_item_added",
            AuditAction::OrderItemRemoved => "order_item_removed",
            AuditAction::OrderModified => "order_modified",
            AuditAction::OrderPaid => "order_paid",
            AuditAction::OrderCancelled => "order_cancelled",
            AuditAction::ProductCreated => "product_created",
            AuditAction::ProductModified => "product_modified",
            AuditAction::ProductDeleted => "product_deleted",
            AuditAction::StockAdjusted => "stock_adjusted",
            AuditAction::DepositReturned => "deposit_returned",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        let now = Utc::now();
        Product {
            id: "p-1".to_string(),
            name: "Cola 0.33l".to_string(),
            description: None,
            category: ProductCategory::Drinks,
            barcode: Some("4001234567890".to_string()),
            price_cents: 250,
            tax_rate_bps: 1900,
            requires_deposit: true,
            deposit_cents: Some(25),
            stock_quantity: 10,
            min_stock_level: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(quantity: i64, price: i64, bps: u32, deposit: Option<i64>, discount: i64) -> LineItem {
        LineItem {
            id: "l-1".to_string(),
            order_id: "o-1".to_string(),
            product_id: "p-1".to_string(),
            name_snapshot: "Item".to_string(),
            quantity,
            unit_price_cents: price,
            tax_rate_bps: bps,
            deposit_cents: deposit,
            discount_cents: discount,
            stock_applied: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tax_rate_display_and_parse() {
        assert_eq!(TaxRate::from_bps(1900).to_string(), "19.00");
        assert_eq!(TaxRate::from_bps(750).to_string(), "7.50");
        assert_eq!("19".parse::<TaxRate>().unwrap().bps(), 1900);
        assert_eq!("7.5".parse::<TaxRate>().unwrap().bps(), 750);
        assert!("101".parse::<TaxRate>().is_err());
        assert!("-1".parse::<TaxRate>().is_err());
        assert!("abc".parse::<TaxRate>().is_err());
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!(" CARD ".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("bitcoin".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_status_serde_is_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PartiallyCancelled).unwrap();
        assert_eq!(json, "\"partially_cancelled\"");
        assert_eq!(OrderStatus::default(), OrderStatus::Open);
        assert!(OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
    }

    #[test]
    fn test_product_deposit_only_when_required() {
        let mut p = product();
        assert_eq!(p.deposit(), Some(Money::from_cents(25)));

        p.requires_deposit = false;
        assert_eq!(p.deposit(), None);
    }

    #[test]
    fn test_product_validate() {
        let mut p = product();
        assert!(p.validate().is_ok());

        p.requires_deposit = false;
        assert!(p.validate().is_err(), "deposit without flag must be rejected");

        let mut p = product();
        p.deposit_cents = None;
        assert!(p.validate().is_err(), "flag without deposit must be rejected");

        let mut p = product();
        p.name = "  ".to_string();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_low_stock() {
        let mut p = product();
        assert!(!p.is_low_stock(), "threshold 0 disables the warning");

        p.min_stock_level = 10;
        assert!(p.is_low_stock());

        p.stock_quantity = 11;
        assert!(!p.is_low_stock());
    }

    #[test]
    fn test_line_item_derived_values() {
        // 3.50 × 2 at 19%, deposit 0.25, discount 0.10 per unit
        let item = line(2, 350, 1900, Some(25), 10);
        assert_eq!(item.subtotal().cents(), 700);
        assert_eq!(item.tax().cents(), 133);
        assert_eq!(item.deposit_total().cents(), 50);
        assert_eq!(item.discount_total().cents(), 20);
        assert_eq!(item.total().cents(), 700 + 133 + 50 - 20);
    }

    #[test]
    fn test_deposit_return_amount() {
        let ret = DepositReturn {
            id: "r-1".to_string(),
            product_id: "p-1".to_string(),
            name_snapshot: "Cola 0.33l".to_string(),
            quantity: 6,
            deposit_cents: 25,
            returned_by: 1,
            returned_at: Utc::now(),
        };
        assert_eq!(ret.amount().cents(), 150);
        assert_eq!(AuditAction::DepositReturned.to_string(), "deposit_returned");
    }

    #[test]
    fn test_line_item_without_deposit() {
        let item = line(3, 100, 0, None, 0);
        assert!(item.deposit_total().is_zero());
        assert_eq!(item.total().cents(), 300);
    }
}
