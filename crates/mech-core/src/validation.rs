//! # Validation Module
//!
//! Input validation for cart operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI input filters                                             │
//! │  ├── digits-only quantity boxes, uppercase discount codes              │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (synchronous, before any request)                │
//! │  ├── item ids, prices, cart size                                       │
//! │  └── discount code normalisation                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Server                                                       │
//! │  └── Authoritative stock, discount rules                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, ValidationError};
use crate::money::UnitPrice;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted item id.
pub const MAX_ITEM_ID_LEN: usize = 64;

/// Longest accepted discount code.
pub const MAX_DISCOUNT_CODE_LEN: usize = 32;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an item id.
///
/// ```rust
/// use mech_core::validation::validate_item_id;
///
/// assert!(validate_item_id("part-42").is_ok());
/// assert!(validate_item_id("").is_err());
/// ```
pub fn validate_item_id(id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: "item id".to_string(),
        });
    }

    if id.len() > MAX_ITEM_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "item id".to_string(),
            max: MAX_ITEM_ID_LEN,
        });
    }

    Ok(())
}

/// Normalises a discount code the way the code box does: trimmed, upper-case.
///
/// ## Rules
/// - Must not be empty ("Please enter a discount code")
/// - At most 32 characters
/// - Letters, digits, hyphens and underscores only
///
/// ```rust
/// use mech_core::validation::normalize_discount_code;
///
/// assert_eq!(normalize_discount_code("  save10 ").unwrap(), "SAVE10");
/// assert!(normalize_discount_code("   ").is_err());
/// ```
pub fn normalize_discount_code(code: &str) -> Result<String, CoreError> {
    let code = code.trim();

    if code.is_empty() {
        return Err(CoreError::InvalidDiscountCode {
            reason: "Please enter a discount code".to_string(),
        });
    }

    if code.len() > MAX_DISCOUNT_CODE_LEN {
        return Err(CoreError::InvalidDiscountCode {
            reason: format!("code must be at most {} characters", MAX_DISCOUNT_CODE_LEN),
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::InvalidDiscountCode {
            reason: "code may only contain letters, numbers, hyphens and underscores".to_string(),
        });
    }

    Ok(code.to_ascii_uppercase())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a unit price.
///
/// Zero is allowed (complimentary items); negative prices are not.
pub fn validate_unit_price(price: UnitPrice) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit price".to_string(),
        });
    }

    Ok(())
}

/// Validates cart size (number of distinct items) before adding one more.
pub fn validate_cart_size(current_items: usize, max_items: usize) -> Result<(), CoreError> {
    if current_items >= max_items {
        return Err(CoreError::CartFull { max: max_items });
    }

    Ok(())
}
