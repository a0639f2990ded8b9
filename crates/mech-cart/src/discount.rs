//! # Discount Validator
//!
//! Turns a typed-in code into an [`AppliedDiscount`], or explains why not.
//!
//! ## Outcomes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     validate(code, subtotal)                            │
//! │                                                                         │
//! │  "  "              ──► Core(InvalidDiscountCode)   no request made      │
//! │  valid, amount>=0  ──► Ok(AppliedDiscount)                              │
//! │  valid, no amount  ──► DiscountRejected("invalid discount amount")      │
//! │  invalid           ──► DiscountRejected(reason)                         │
//! │  unreachable/5xx   ──► ValidationUnavailable                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The amount is stored as returned; capping at the subtotal happens in the
//! pricing calculator every time totals are derived.

use mech_core::validation::normalize_discount_code;
use mech_core::{AppliedDiscount, Money};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{CartError, CartResult};
use crate::services::DiscountRules;

#[derive(Clone)]
pub struct DiscountValidator {
    rules: Arc<dyn DiscountRules>,
}

impl DiscountValidator {
    pub fn new(rules: Arc<dyn DiscountRules>) -> Self {
        Self { rules }
    }

    /// Normalises the code without asking anyone.
    pub fn normalize(code: &str) -> CartResult<String> {
        Ok(normalize_discount_code(code)?)
    }

    /// Validates `code` against `subtotal`.
    pub async fn validate(&self, code: &str, subtotal: Money) -> CartResult<AppliedDiscount> {
        let code = Self::normalize(code)?;

        let verdict = match self.rules.check(&code, subtotal).await {
            Ok(verdict) => verdict,
            Err(err @ CartError::ValidationUnavailable(_)) => return Err(err),
            Err(other) => return Err(CartError::ValidationUnavailable(other.to_string())),
        };

        if !verdict.valid {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "Invalid discount code".to_string());
            debug!(%code, %reason, "Discount code rejected");
            return Err(CartError::DiscountRejected { code, reason });
        }

        match verdict.amount {
            Some(amount) if !amount.is_negative() => {
                debug!(%code, amount = amount.cents(), "Discount code accepted");
                Ok(AppliedDiscount::new(code, amount))
            }
            other => {
                warn!(%code, amount = ?other, "Discount service accepted code without a usable amount");
                Err(CartError::DiscountRejected {
                    code,
                    reason: "invalid discount amount".to_string(),
                })
            }
        }
    }
}
