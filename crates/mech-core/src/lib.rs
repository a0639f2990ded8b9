//! # mech-core: Pure Cart Logic for Future Mech
//!
//! This crate holds the cart rules of the Future Mech shop as plain,
//! synchronous code with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Future Mech Cart Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI layer (subscriber)                        │   │
//! │  │    Parts list ──► Cart page ──► Discount box ──► Payment page   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ CartSnapshot                           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    mech-cart (async service)                    │   │
//! │  │    add_item, update_quantity, apply_discount, prepare_checkout  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mech-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   money   │  │   store   │  │  pricing  │  │ checkout  │  │   │
//! │  │   │   Money   │  │ LineItem  │  │ subtotal  │  │ readiness │  │   │
//! │  │   │ UnitPrice │  │   Store   │  │  total    │  │ card form │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO ASYNC • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money (cents) and UnitPrice (4 decimal places), banker's rounding
//! - [`types`] - Line items, applied discounts, notices
//! - [`store`] - Insertion-ordered line item store with stock ceilings
//! - [`pricing`] - Subtotal / discount / total calculator
//! - [`cart`] - Versioned cart aggregate and its snapshot
//! - [`checkout`] - Checkout readiness, payment methods, card form rules
//! - [`validation`] - Input checks that run before any request
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use mech_core::{AppliedDiscount, Cart, Money, NewLineItem, UnitPrice};
//!
//! let mut cart = Cart::default();
//! cart.add_item(NewLineItem::new("A", UnitPrice::from_cents(2500), 2, 5)).unwrap();
//! cart.add_item(NewLineItem::new("B", UnitPrice::from_cents(1000), 1, 1)).unwrap();
//! cart.apply_discount(AppliedDiscount::new("SAVE10", Money::from_cents(600)));
//!
//! let snapshot = cart.snapshot();
//! assert_eq!(snapshot.subtotal.to_string(), "$60.00");
//! assert_eq!(snapshot.total.to_string(), "$54.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod checkout;
pub mod error;
pub mod money;
pub mod pricing;
pub mod store;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartSnapshot};
pub use checkout::{CardDetails, PaymentForm, PaymentMethod};
pub use error::{CheckoutError, CoreError, CoreResult, ValidationError};
pub use money::{Money, UnitPrice};
pub use pricing::PriceBreakdown;
pub use store::LineItemStore;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default limit on distinct items in a single cart.
///
/// ## Business Reason
/// Keeps carts to a reasonable size; the service can lower or raise it
/// through configuration.
pub const MAX_CART_ITEMS: usize = 100;
