//! # Cart Configuration
//!
//! Configuration for the cart service and its HTTP backend.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MECH_API_BASE_URL=https://shop.example.com                         │
//! │     MECH_REQUEST_TIMEOUT_MS=5000                                       │
//! │     MECH_EAGER_DISCOUNT_REVALIDATION=true                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/cart/cart.toml (Linux)                                   │
//! │     ~/Library/Application Support/com.futuremech.cart/cart.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     http://127.0.0.1:5000/, 10s timeout, 100 items                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # cart.toml
//! [api]
//! base_url = "https://shop.example.com/"
//! request_timeout_ms = 10000
//!
//! [cart]
//! max_items = 100
//! eager_discount_revalidation = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{CartError, CartResult};

// =============================================================================
// API Settings
// =============================================================================

/// Where the cart-sync, discount and stock endpoints live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the shop backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000/".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// =============================================================================
// Cart Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSettings {
    /// Maximum distinct items per cart.
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Re-validate the applied discount after every committed item change.
    /// When off, the discount is only re-validated at checkout.
    #[serde(default)]
    pub eager_discount_revalidation: bool,
}

fn default_max_items() -> usize {
    mech_core::MAX_CART_ITEMS
}

impl Default for CartSettings {
    fn default() -> Self {
        CartSettings {
            max_items: default_max_items(),
            eager_discount_revalidation: false,
        }
    }
}

// =============================================================================
// Main Cart Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub cart: CartSettings,
}

impl CartConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (cart.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> CartResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading cart config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load cart config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> CartResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| CartError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CartError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| CartError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Cart config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CartResult<()> {
        let url = url::Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CartError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.request_timeout_ms == 0 {
            return Err(CartError::InvalidConfig(
                "request_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.cart.max_items == 0 {
            return Err(CartError::InvalidConfig(
                "max_items must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `MECH_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MECH_API_BASE_URL") {
            debug!(url = %url, "Overriding API base URL from environment");
            self.api.base_url = url;
        }

        if let Some(timeout) = lookup("MECH_REQUEST_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.api.request_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring non-numeric MECH_REQUEST_TIMEOUT_MS"),
            }
        }

        if let Some(eager) = lookup("MECH_EAGER_DISCOUNT_REVALIDATION") {
            match eager.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.cart.eager_discount_revalidation = true,
                "0" | "false" | "no" | "off" => self.cart.eager_discount_revalidation = false,
                _ => warn!(value = %eager, "Unknown MECH_EAGER_DISCOUNT_REVALIDATION value"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "futuremech", "cart")
            .map(|dirs| dirs.config_dir().join("cart.toml"))
    }
}
