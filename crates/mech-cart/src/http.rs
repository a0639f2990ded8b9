//! # HTTP Backend
//!
//! JSON-over-HTTP implementation of [`CartSync`], [`DiscountRules`] and
//! [`StockSource`] against the shop backend.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Method  Path                    Body / Query           Response        │
//! │  ──────  ────                    ────────────           ────────        │
//! │  POST    update_cart/{item_id}   {"quantity": 3}        2xx             │
//! │  POST    clear_cart              -                      2xx             │
//! │  POST    api/validate_discount   {"code", "subtotal_cents"}             │
//! │                                  → {"valid", "discount_cents"?,         │
//! │                                     "reason"?}                          │
//! │  GET     api/stock               ?ids=a,b               [{"item_id",    │
//! │                                                           "stock"}]     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All amounts cross the wire as integer cents. Paths are resolved relative
//! to the configured base URL, so a base of `https://shop/api-v2/` works.

use async_trait::async_trait;
use mech_core::{ItemId, Money};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::{ApiSettings, CartConfig};
use crate::error::{CartError, CartResult};
use crate::services::{CartSync, DiscountRules, DiscountVerdict, StockSource};

/// Client for the shop backend.
#[derive(Debug, Clone)]
pub struct HttpCartBackend {
    base: Url,
    http: Client,
}

impl HttpCartBackend {
    pub fn new(settings: &ApiSettings) -> CartResult<Self> {
        let base = Url::parse(&settings.base_url)?;
        if base.cannot_be_a_base() {
            return Err(CartError::InvalidUrl(settings.base_url.clone()));
        }

        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| CartError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self { base, http })
    }

    pub fn from_config(config: &CartConfig) -> CartResult<Self> {
        Self::new(&config.api)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Appends path segments to the base URL. Segments are percent-encoded,
    /// so an item id can never escape its path position.
    fn endpoint(&self, segments: &[&str]) -> CartResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CartError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Turns a non-2xx response into a message carrying status and body.
async fn failure_message(what: &str, response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    format!("{what} failed with status {status}: {text}")
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct QuantityBody {
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct DiscountRequest<'a> {
    code: &'a str,
    subtotal_cents: i64,
}

#[derive(Debug, Deserialize)]
struct DiscountResponse {
    valid: bool,
    #[serde(default)]
    discount_cents: Option<i64>,
    #[serde(default)]
    reason: Option<String>,
}

impl From<DiscountResponse> for DiscountVerdict {
    fn from(response: DiscountResponse) -> Self {
        DiscountVerdict {
            valid: response.valid,
            amount: response.discount_cents.map(Money::from_cents),
            reason: response.reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StockEntry {
    item_id: ItemId,
    stock: u32,
}

// =============================================================================
// Service Implementations
// =============================================================================

#[async_trait]
impl CartSync for HttpCartBackend {
    async fn persist_quantity(&self, item_id: &ItemId, quantity: u32) -> CartResult<()> {
        let url = self.endpoint(&["update_cart", item_id.as_str()])?;
        debug!(%url, quantity, "Persisting cart quantity");

        let response = self
            .http
            .post(url)
            .json(&QuantityBody { quantity })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CartError::NetworkFailure(
                failure_message("update_cart", response).await,
            ));
        }

        Ok(())
    }

    async fn clear(&self) -> CartResult<()> {
        let url = self.endpoint(&["clear_cart"])?;
        debug!(%url, "Clearing server cart");

        let response = self.http.post(url).send().await?;

        if !response.status().is_success() {
            return Err(CartError::NetworkFailure(
                failure_message("clear_cart", response).await,
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl DiscountRules for HttpCartBackend {
    async fn check(&self, code: &str, subtotal: Money) -> CartResult<DiscountVerdict> {
        let url = self.endpoint(&["api", "validate_discount"])?;
        debug!(%url, code, subtotal = subtotal.cents(), "Validating discount code");

        let unavailable = |e: reqwest::Error| {
            warn!(error = %e, "Discount service unreachable");
            CartError::ValidationUnavailable(e.to_string())
        };

        let response = self
            .http
            .post(url)
            .json(&DiscountRequest {
                code,
                subtotal_cents: subtotal.cents(),
            })
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            let message = failure_message("validate_discount", response).await;
            warn!(%message, "Discount service returned an error");
            return Err(CartError::ValidationUnavailable(message));
        }

        let parsed: DiscountResponse = response.json().await.map_err(unavailable)?;
        Ok(parsed.into())
    }
}

#[async_trait]
impl StockSource for HttpCartBackend {
    async fn stock_ceilings(&self, item_ids: &[ItemId]) -> CartResult<Vec<(ItemId, u32)>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut url = self.endpoint(&["api", "stock"])?;
        let ids = item_ids
            .iter()
            .map(ItemId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        url.query_pairs_mut().append_pair("ids", &ids);
        debug!(%url, count = item_ids.len(), "Fetching stock ceilings");

        let response = self.http.get(url).send().await?;

        if !response.status().is_success() {
            return Err(CartError::NetworkFailure(
                failure_message("stock", response).await,
            ));
        }

        let entries: Vec<StockEntry> = response.json().await?;
        Ok(entries.into_iter().map(|e| (e.item_id, e.stock)).collect())
    }
}
