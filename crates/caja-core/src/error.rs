//! # Error Types
//!
//! Domain-specific error types for caja-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  caja-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations (recoverable)         │
//! │  ├── TenderIssue      - Why a tender list was rejected                 │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  caja-db errors                                                        │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  caja-engine errors                                                    │
//! │  └── EngineError      - Core | Db | Timeout | Unavailable              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                  │
//! │                          DbError ───┴─► EngineError → caller           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `CoreError` is a local, recoverable condition. Each variant carries
//! enough context (product id, shortfall, shift id) for the caller to retry
//! or correct its input.

use thiserror::Error;

use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{ShiftStatus, TenderMethod};

// =============================================================================
// Core Error
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // -------------------------------------------------------------------------
    // Cart / stock
    // -------------------------------------------------------------------------
    /// Product has no stock at all.
    #[error("Product {product_id} is out of stock")]
    OutOfStock { product_id: String },

    /// Adding to the cart would go past the stock snapshot.
    ///
    /// ## User Workflow
    /// ```text
    /// Add to Cart (qty: 1, already in cart: 3)
    ///      │
    ///      ▼
    /// Check snapshot: available=3
    ///      │
    ///      ▼
    /// StockExceeded { available: 3, requested: 4 }  ← cap is `available`
    /// ```
    #[error("Stock exceeded for {product_id}: available {available}, requested {requested}")]
    StockExceeded {
        product_id: String,
        available: Quantity,
        requested: Quantity,
    },

    /// Stock moved between building the cart and committing the sale.
    #[error("Stock changed for {product_id}: available {available}, requested {requested}")]
    StockChanged {
        product_id: String,
        available: Quantity,
        requested: Quantity,
    },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Cart line not found: {0}")]
    LineNotFound(u32),

    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    // -------------------------------------------------------------------------
    // Shift lifecycle
    // -------------------------------------------------------------------------
    #[error("Till {till_id} already has active shift {shift_id}")]
    ShiftAlreadyActive { till_id: String, shift_id: String },

    #[error("Shift {shift_id} is not active")]
    NoActiveShift { shift_id: String },

    #[error("Shift {shift_id} is closed, no further sales can be recorded")]
    ShiftClosed { shift_id: String },

    #[error("Shift {shift_id} is {status}, it must be closed before settlement")]
    ShiftNotClosed {
        shift_id: String,
        status: ShiftStatus,
    },

    #[error("Shift {shift_id} is already settled")]
    AlreadySettled { shift_id: String },

    #[error("Shift not found: {0}")]
    ShiftNotFound(String),

    #[error("Till not found: {0}")]
    TillNotFound(String),

    // -------------------------------------------------------------------------
    // Tender / customer
    // -------------------------------------------------------------------------
    #[error("Invalid tender: {0}")]
    InvalidTender(TenderIssue),

    #[error("{method} tender requires a customer")]
    CustomerRequired { method: TenderMethod },

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    // -------------------------------------------------------------------------
    // Sales
    // -------------------------------------------------------------------------
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Sale {sale_id} has already been reversed")]
    AlreadyReversed { sale_id: String },

    // -------------------------------------------------------------------------
    // Treasury / reconciliation
    // -------------------------------------------------------------------------
    #[error("Bank account not found: {0}")]
    AccountNotFound(String),

    #[error("Movement {movement_id} is already conciliated")]
    AlreadyConciliated { movement_id: String },

    #[error("Bank movement not found: {0}")]
    MovementNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Tender Issue
// =============================================================================

/// Reason attached to [`CoreError::InvalidTender`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenderIssue {
    #[error("no tender entries supplied")]
    Empty,

    #[error("at most {max} tender entries are allowed, got {count}")]
    TooManyEntries { count: usize, max: usize },

    #[error("{method} appears more than once")]
    DuplicateMethod { method: TenderMethod },

    #[error("{method} amount must be positive, got {amount}")]
    NonPositiveAmount { method: TenderMethod, amount: Money },

    /// Tendered sum differs from the total; `shortfall` is total − tendered.
    #[error("tendered {tendered} does not match total {total} (shortfall {shortfall})")]
    SumMismatch {
        total: Money,
        tendered: Money,
        shortfall: Money,
    },

    #[error("credit of {requested} exceeds available credit {available}")]
    CreditExceeded { available: Money, requested: Money },

    #[error("advance of {requested} exceeds advance balance {available}")]
    AdvanceExceeded { available: Money, requested: Money },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, caught before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
