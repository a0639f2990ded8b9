//! # In-Memory Discount Rules
//!
//! A local [`DiscountRules`] authority holding the shop's discount table in
//! memory. Used for offline demos and as the fake in service tests.
//!
//! ## Rule Evaluation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Discount Rule Checks (in order)                     │
//! │                                                                         │
//! │  1. code known?            no  → "Invalid discount code"                │
//! │  2. active?                no  → "Discount code is not active"          │
//! │  3. expires_on >= today?   no  → "Discount code has expired"            │
//! │  4. used_count < limit?    no  → "Discount code has reached its         │
//! │                                   usage limit"                          │
//! │  5. subtotal >= minimum?   no  → "Minimum order of $X required"         │
//! │                                                                         │
//! │  amount = Percentage(bps): subtotal × bps / 10000 (half to even)        │
//! │           Fixed(m):        min(m, subtotal)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use mech_core::Money;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CartError, CartResult};
use crate::services::{DiscountRules, DiscountVerdict};

// =============================================================================
// Discount Rule
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percentage in basis points (1000 = 10%).
    Percentage(u32),
    /// Fixed amount, never more than the subtotal.
    Fixed(Money),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRule {
    pub code: String,
    pub kind: DiscountKind,
    pub active: bool,
    /// Last day the code can be used (inclusive).
    pub expires_on: Option<NaiveDate>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub min_order: Option<Money>,
}

impl DiscountRule {
    pub fn new(code: impl Into<String>, kind: DiscountKind) -> Self {
        DiscountRule {
            code: code.into().trim().to_ascii_uppercase(),
            kind,
            active: true,
            expires_on: None,
            usage_limit: None,
            used_count: 0,
            min_order: None,
        }
    }

    pub fn expires_on(mut self, date: NaiveDate) -> Self {
        self.expires_on = Some(date);
        self
    }

    pub fn usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn min_order(mut self, amount: Money) -> Self {
        self.min_order = Some(amount);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Evaluates the rule against a subtotal on a given day.
    pub fn evaluate(&self, subtotal: Money, today: NaiveDate) -> DiscountVerdict {
        if !self.active {
            return DiscountVerdict::rejected("Discount code is not active");
        }

        if self.expires_on.is_some_and(|last_day| last_day < today) {
            return DiscountVerdict::rejected("Discount code has expired");
        }

        if self
            .usage_limit
            .is_some_and(|limit| self.used_count >= limit)
        {
            return DiscountVerdict::rejected("Discount code has reached its usage limit");
        }

        if let Some(minimum) = self.min_order {
            if subtotal < minimum {
                return DiscountVerdict::rejected(format!("Minimum order of {} required", minimum));
            }
        }

        let amount = match self.kind {
            DiscountKind::Percentage(bps) => subtotal.percentage(bps),
            DiscountKind::Fixed(value) => value.min(subtotal),
        };

        DiscountVerdict::accepted(amount)
    }
}

// =============================================================================
// In-Memory Rules
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryDiscountRules {
    rules: RwLock<HashMap<String, DiscountRule>>,
    /// Fixed "today" for evaluation; the system date when unset.
    today: Option<NaiveDate>,
}

impl InMemoryDiscountRules {
    pub fn new(rules: impl IntoIterator<Item = DiscountRule>) -> Self {
        InMemoryDiscountRules {
            rules: RwLock::new(rules.into_iter().map(|r| (r.code.clone(), r)).collect()),
            today: None,
        }
    }

    /// Pins the evaluation date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub async fn insert(&self, rule: DiscountRule) {
        self.rules.write().await.insert(rule.code.clone(), rule);
    }

    /// Counts one redemption of `code` against its usage limit.
    pub async fn record_use(&self, code: &str) -> CartResult<()> {
        let key = code.trim().to_ascii_uppercase();
        let mut rules = self.rules.write().await;
        let rule = rules
            .get_mut(&key)
            .ok_or_else(|| CartError::DiscountRejected {
                code: key.clone(),
                reason: "Invalid discount code".to_string(),
            })?;
        rule.used_count += 1;
        debug!(code = %key, used = rule.used_count, "Discount use recorded");
        Ok(())
    }

    pub async fn get(&self, code: &str) -> Option<DiscountRule> {
        self.rules
            .read()
            .await
            .get(&code.trim().to_ascii_uppercase())
            .cloned()
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[async_trait]
impl DiscountRules for InMemoryDiscountRules {
    async fn check(&self, code: &str, subtotal: Money) -> CartResult<DiscountVerdict> {
        let key = code.trim().to_ascii_uppercase();
        let rules = self.rules.read().await;

        let verdict = match rules.get(&key) {
            Some(rule) => rule.evaluate(subtotal, self.today()),
            None => DiscountVerdict::rejected("Invalid discount code"),
        };
        debug!(code = %key, valid = verdict.valid, "Discount rule evaluated");

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rules() -> InMemoryDiscountRules {
        InMemoryDiscountRules::new([
            DiscountRule::new("SAVE10", DiscountKind::Percentage(1000)),
            DiscountRule::new("FIVER", DiscountKind::Fixed(Money::from_cents(500))),
            DiscountRule::new("SPRING", DiscountKind::Percentage(500)).expires_on(day(2026, 3, 31)),
            DiscountRule::new("ONCE", DiscountKind::Percentage(500)).usage_limit(1),
            DiscountRule::new("BIGSPEND", DiscountKind::Fixed(Money::from_cents(1000)))
                .min_order(Money::from_cents(10_000)),
            DiscountRule::new("RETIRED", DiscountKind::Percentage(500)).inactive(),
        ])
        .with_today(day(2026, 6, 1))
    }

    #[tokio::test]
    async fn test_percentage_discount() {
        let verdict = rules().check("save10", Money::from_cents(6000)).await.unwrap();
        assert_eq!(verdict, DiscountVerdict::accepted(Money::from_cents(600)));
    }

    #[tokio::test]
    async fn test_fixed_discount_capped_at_subtotal() {
        let verdict = rules().check("FIVER", Money::from_cents(300)).await.unwrap();
        assert_eq!(verdict.amount, Some(Money::from_cents(300)));
    }

    #[tokio::test]
    async fn test_rejections() {
        let rules = rules();
        let subtotal = Money::from_cents(6000);

        for (code, reason) in [
            ("NOPE", "Invalid discount code"),
            ("SPRING", "Discount code has expired"),
            ("RETIRED", "Discount code is not active"),
            ("BIGSPEND", "Minimum order of $100.00 required"),
        ] {
            let verdict = rules.check(code, subtotal).await.unwrap();
            assert!(!verdict.valid, "{} should be rejected", code);
            assert_eq!(verdict.reason.as_deref(), Some(reason));
        }
    }

    #[tokio::test]
    async fn test_usage_limit() {
        let rules = rules();
        assert!(rules.check("ONCE", Money::from_cents(1000)).await.unwrap().valid);

        rules.record_use("once").await.unwrap();
        let verdict = rules.check("ONCE", Money::from_cents(1000)).await.unwrap();
        assert!(!verdict.valid);
        assert_eq!(rules.get("ONCE").await.unwrap().used_count, 1);
    }

    #[tokio::test]
    async fn test_expiry_day_is_inclusive() {
        let rules = rules().with_today(day(2026, 3, 31));
        assert!(rules.check("SPRING", Money::from_cents(1000)).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_record_use_unknown_code() {
        assert!(rules().record_use("GHOST").await.is_err());
    }

    #[test]
    fn test_rule_serialization() {
        let rule = DiscountRule::new("save10", DiscountKind::Percentage(1000));
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["code"], "SAVE10");
        assert_eq!(json["kind"]["type"], "percentage");
        assert_eq!(json["kind"]["value"], 1000);
    }
}
