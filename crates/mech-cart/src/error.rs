//! # Cart Service Error Types
//!
//! Error types for cart service operations.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Cart Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Local       │  │     Remote      │  │     Configuration       │ │
//! │  │  (no request)   │  │                 │  │                         │ │
//! │  │  Core           │  │  NetworkFailure │  │  InvalidConfig          │ │
//! │  │  Checkout       │  │  Validation-    │  │  ConfigLoadFailed       │ │
//! │  │                 │  │   Unavailable   │  │  ConfigSaveFailed       │ │
//! │  │                 │  │  DiscountReject │  │  InvalidUrl             │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Every error leaves the cart exactly as it was before the call.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use mech_core::{CheckoutError, CoreError};
use thiserror::Error;

/// Result type alias for cart service operations.
pub type CartResult<T> = Result<T, CartError>;

#[derive(Debug, Error)]
pub enum CartError {
    // =========================================================================
    // Local Errors
    // =========================================================================
    /// A cart rule rejected the mutation before any request was made.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The cart is not ready for payment.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The discount service could not be reached or answered badly.
    ///
    /// Distinct from a rejection: the code might still be valid.
    #[error("Discount validation unavailable: {0}")]
    ValidationUnavailable(String),

    /// The discount service answered and said no.
    #[error("Discount code {code} rejected: {reason}")]
    DiscountRejected { code: String, reason: String },

    /// A cart-sync or stock request failed.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid cart configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for CartError {
    fn from(err: reqwest::Error) -> Self {
        CartError::NetworkFailure(err.to_string())
    }
}

impl From<url::ParseError> for CartError {
    fn from(err: url::ParseError) -> Self {
        CartError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for CartError {
    fn from(err: std::io::Error) -> Self {
        CartError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for CartError {
    fn from(err: toml::de::Error) -> Self {
        CartError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for CartError {
    fn from(err: toml::ser::Error) -> Self {
        CartError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl CartError {
    /// Returns true if the caller may retry the same call.
    ///
    /// Nothing is retried automatically; this only tells the UI whether to
    /// offer a "try again".
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CartError::NetworkFailure(_) | CartError::ValidationUnavailable(_)
        )
    }

    /// Returns true if the error was raised before any request was made.
    pub fn is_local(&self) -> bool {
        matches!(self, CartError::Core(_) | CartError::Checkout(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CartError::InvalidConfig(_)
                | CartError::InvalidUrl(_)
                | CartError::ConfigLoadFailed(_)
                | CartError::ConfigSaveFailed(_)
        )
    }
}
