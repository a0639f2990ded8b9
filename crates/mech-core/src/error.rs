//! # Error Types
//!
//! Domain-specific error types for mech-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mech-core errors (this file)                                          │
//! │  ├── CoreError        - Cart rule violations (rejected synchronously)  │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── CheckoutError    - Cart not ready to pay                          │
//! │                                                                         │
//! │  mech-cart errors (separate crate)                                     │
//! │  └── CartError        - Adds NetworkFailure, ValidationUnavailable     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CartError → UI message            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `StockExceeded` is deliberately NOT here: clamping to the stock ceiling is
//! recoverable and is reported as a [`crate::types::CartNotice`].

use thiserror::Error;

use crate::types::ItemId;

// =============================================================================
// Core Error
// =============================================================================

/// Cart rule violations.
///
/// These never reach the network layer: the mutation is rejected before any
/// request is made and the cart is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Quantity outside `1..=stock_ceiling` on add.
    ///
    /// ## User Workflow
    /// ```text
    /// Add to Cart (qty: 5, stock: 3)
    ///      │
    ///      ▼
    /// InvalidQuantity { item_id: "42", quantity: 5, stock_ceiling: 3 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 items available in stock"
    /// ```
    #[error("Invalid quantity {quantity} for item {item_id} (stock: {stock_ceiling})")]
    InvalidQuantity {
        item_id: ItemId,
        quantity: i64,
        stock_ceiling: u32,
    },

    /// The item is not in the cart.
    #[error("Item not in cart: {0}")]
    ItemNotFound(ItemId),

    /// Cart has reached its distinct-item limit.
    #[error("Cart cannot have more than {max} items")]
    CartFull { max: usize },

    /// Discount code is empty or malformed.
    #[error("Invalid discount code: {reason}")]
    InvalidDiscountCode { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., expiry not MM/YY).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Checkout Error
// =============================================================================

/// Reasons a cart cannot proceed to payment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("Your cart is empty")]
    EmptyCart,

    /// Card details missing or invalid for a card payment.
    #[error("Invalid payment details: {0}")]
    PaymentDetails(#[from] ValidationError),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
