//! # rampay-config
//!
//! Rampay configuration.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

use alloy_primitives::{Address, ChainId, address};
use figment::{
    Figment, Metadata, Profile, Provider,
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Map},
};
use rampay_common::{Asset, Fiat};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub mod error;
pub use error::ExtractConfigError;

// reexport so cli types can implement `figment::Provider` to merge their arguments
pub use figment;

/// Decimal precision, ticker and price-feed id of one asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub decimals: u8,
    /// Identifier of the asset on the price feed.
    pub price_id: String,
}

/// Rampay configuration
///
/// # Defaults
///
/// All configuration values have a default, targeting Sepolia with Circle's test USDC. See the
/// [`Default`] impl for the values.
///
/// # Sources
///
/// Values are merged from, in increasing priority:
///
/// - [`Config::default()`]
/// - `rampay.toml` in the current directory, or the file named by `RAMPAY_CONFIG`
/// - `RAMPAY_`-prefixed environment variables, nested keys separated by `__`
///   (`RAMPAY_TOKEN__DECIMALS`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The single network payments are accepted on.
    pub chain_id: ChainId,
    pub chain_name: String,
    /// JSON-RPC endpoint backing the wallet provider.
    pub rpc_url: String,
    /// Contract address of the alternate asset.
    pub token_address: Address,
    pub native: AssetConfig,
    pub token: AssetConfig,
    pub price_feed_url: String,
    /// Fiat currency amounts are entered in unless overridden.
    pub fiat: Fiat,
    /// Seconds between two price refreshes.
    pub quote_interval: u64,
    /// Gas units of a plain value transfer.
    pub native_transfer_gas: u64,
    /// Gas units assumed for a token transfer when simulating it fails.
    pub token_transfer_gas: u64,
    /// Milliseconds between two account/chain polls of the RPC provider.
    pub event_poll_interval: u64,
    pub confirmations: u64,
    /// Seconds to wait for a transfer to be confirmed.
    pub transaction_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: Self::SEPOLIA_CHAIN_ID,
            chain_name: "sepolia".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            token_address: Self::SEPOLIA_USDC,
            native: AssetConfig {
                symbol: "ETH".to_string(),
                decimals: 18,
                price_id: "ethereum".to_string(),
            },
            token: AssetConfig {
                symbol: "USDC".to_string(),
                decimals: 6,
                price_id: "usd-coin".to_string(),
            },
            price_feed_url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
            fiat: Fiat::Inr,
            quote_interval: 60,
            native_transfer_gas: 21_000,
            token_transfer_gas: 65_000,
            event_poll_interval: 1_000,
            confirmations: 1,
            transaction_timeout: 120,
        }
    }
}

impl Config {
    /// The default config file name.
    pub const FILE_NAME: &'static str = "rampay.toml";

    /// Environment variable overriding the config file path.
    pub const CONFIG_ENV: &'static str = "RAMPAY_CONFIG";

    /// Prefix of environment variables merged into the config.
    pub const ENV_PREFIX: &'static str = "RAMPAY_";

    pub const SEPOLIA_CHAIN_ID: ChainId = 11155111;

    /// Circle's USDC deployment on Sepolia.
    ///
    /// `0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238`
    pub const SEPOLIA_USDC: Address = address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238");

    /// Returns the current `Config`, merged from all sources.
    pub fn load() -> Result<Self, ExtractConfigError> {
        Self::try_from(Self::figment())
    }

    /// Attempts to extract a `Config` from `provider`, returning the result.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rampay_config::{Config, figment::providers::{Format, Toml}};
    ///
    /// // Use the default `Figment`, but allow values from `other.toml` to supersede its values.
    /// let figment = Config::figment().merge(Toml::file("other.toml"));
    ///
    /// let config = Config::try_from(figment);
    /// ```
    pub fn try_from<T: Provider>(provider: T) -> Result<Self, ExtractConfigError> {
        trace!("load config with provider: {:?}", provider.metadata());
        Figment::from(provider).extract::<Self>().map_err(ExtractConfigError::new)
    }

    /// Returns the default figment: defaults, the TOML file and the environment.
    pub fn figment() -> Figment {
        Self::figment_from(Self::config_path())
    }

    /// Same as [`Config::figment`], reading the TOML file at `path`.
    pub fn figment_from(path: impl AsRef<Path>) -> Figment {
        Figment::from(Self::default())
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(Self::ENV_PREFIX).ignore(&["CONFIG"]).split("__").global())
    }

    /// Path of the TOML file merged by [`Config::figment`].
    pub fn config_path() -> PathBuf {
        std::env::var_os(Self::CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::FILE_NAME))
    }

    /// Returns the configuration of `asset`.
    pub fn asset(&self, asset: Asset) -> &AssetConfig {
        match asset {
            Asset::Native => &self.native,
            Asset::Token => &self.token,
        }
    }

    pub fn is_supported_chain(&self, chain_id: ChainId) -> bool {
        self.chain_id == chain_id
    }

    pub fn quote_interval(&self) -> Duration {
        Duration::from_secs(self.quote_interval)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_interval)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_secs(self.transaction_timeout)
    }
}

impl Provider for Config {
    fn metadata(&self) -> Metadata {
        Metadata::named("Rampay Config")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}
