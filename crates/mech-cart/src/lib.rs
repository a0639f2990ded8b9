//! # mech-cart: Cart Mutation API for Future Mech
//!
//! This crate owns the session cart and every network call that touches it.
//! The UI calls [`CartService`] operations and renders the snapshots it
//! publishes; it never reads totals from anywhere else.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cart Service Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  CartService (single entry point)                │  │
//! │  │                                                                  │  │
//! │  │  add_item / update_quantity / remove_item / clear_cart          │  │
//! │  │  apply_discount / revalidate_discount / refresh_stock           │  │
//! │  │  prepare_checkout / subscribe                                    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │   CartSync     │  │ DiscountRules  │  │   StockSource          │    │
//! │  │                │  │ (via           │  │                        │    │
//! │  │ update_cart/id │  │  Discount-     │  │ api/stock?ids=         │    │
//! │  │ clear_cart     │  │  Validator)    │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │         │                     │                     │                   │
//! │         └──────────── HttpCartBackend (reqwest) ────┘                   │
//! │                                                                         │
//! │  SNAPSHOTS (to the UI):                                                │
//! │  • tokio watch channel, always the latest committed CartSnapshot       │
//! │  • every operation also returns CartUpdate { snapshot, notices }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`service`] - `CartService`, request ordering and stale-response discard
//! - [`discount`] - `DiscountValidator`
//! - [`services`] - `CartSync`, `DiscountRules`, `StockSource` seams
//! - [`http`] - `HttpCartBackend`, the reqwest implementation of the seams
//! - [`rules`] - `InMemoryDiscountRules` for offline use and tests
//! - [`config`] - `CartConfig` (file + environment)
//! - [`error`] - `CartError`
//! - [`telemetry`] - tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mech_cart::{CartConfig, CartService};
//! use mech_core::{NewLineItem, UnitPrice};
//!
//! mech_cart::telemetry::init_tracing();
//! let config = CartConfig::load_or_default(None);
//! let cart = CartService::with_http_backend(&config)?;
//!
//! let update = cart
//!     .add_item(NewLineItem::new("42", UnitPrice::from_cents(2500), 2, 5))
//!     .await?;
//! println!("Subtotal: {}", update.snapshot.subtotal);
//!
//! let update = cart.apply_discount("SAVE10").await?;
//! println!("Total: {}", update.snapshot.total);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod discount;
pub mod error;
pub mod http;
pub mod rules;
pub mod service;
pub mod services;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ApiSettings, CartConfig, CartSettings};
pub use discount::DiscountValidator;
pub use error::{CartError, CartResult};
pub use http::HttpCartBackend;
pub use rules::{DiscountKind, DiscountRule, InMemoryDiscountRules};
pub use service::{CartService, CartUpdate, CheckoutSummary};
pub use services::{CartSync, DiscountRules, DiscountVerdict, StockSource};
