//! # External Service Seams
//!
//! The three collaborators the cart service talks to. Production wires all
//! three to [`crate::http::HttpCartBackend`]; tests use in-memory fakes.
//!
//! ```text
//! ┌──────────────┐   persist_quantity / clear   ┌─────────────────────────┐
//! │              │ ───────────────────────────► │ CartSync                │
//! │ CartService  │   check(code, subtotal)      ├─────────────────────────┤
//! │              │ ───────────────────────────► │ DiscountRules           │
//! │              │   stock_ceilings(ids)        ├─────────────────────────┤
//! │              │ ───────────────────────────► │ StockSource             │
//! └──────────────┘                              └─────────────────────────┘
//! ```

use async_trait::async_trait;
use mech_core::{ItemId, Money};
use serde::{Deserialize, Serialize};

use crate::error::CartResult;

/// Server-side persistence of cart contents.
#[async_trait]
pub trait CartSync: Send + Sync {
    /// Stores the absolute quantity of an item. `0` removes it.
    async fn persist_quantity(&self, item_id: &ItemId, quantity: u32) -> CartResult<()>;

    /// Empties the server-side cart.
    async fn clear(&self) -> CartResult<()>;
}

/// Answer of the discount-rules service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountVerdict {
    pub valid: bool,
    /// Discount amount for the submitted subtotal, present when valid.
    pub amount: Option<Money>,
    /// Human-readable reason, present when invalid.
    pub reason: Option<String>,
}

impl DiscountVerdict {
    pub fn accepted(amount: Money) -> Self {
        DiscountVerdict {
            valid: true,
            amount: Some(amount),
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        DiscountVerdict {
            valid: false,
            amount: None,
            reason: Some(reason.into()),
        }
    }
}

/// Authority on discount codes.
///
/// Implementations return `Err(ValidationUnavailable)` when they cannot give
/// an answer; an `Ok` verdict with `valid = false` is a real rejection.
#[async_trait]
pub trait DiscountRules: Send + Sync {
    async fn check(&self, code: &str, subtotal: Money) -> CartResult<DiscountVerdict>;
}

/// Source of current stock ceilings.
#[async_trait]
pub trait StockSource: Send + Sync {
    /// Returns `(item_id, stock)` pairs for the ids it knows; unknown ids are
    /// simply left out.
    async fn stock_ceilings(&self, item_ids: &[ItemId]) -> CartResult<Vec<(ItemId, u32)>>;
}
