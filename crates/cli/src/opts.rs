use alloy_primitives::ChainId;
use clap::Parser;
use eyre::Result;
use rampay_common::Fiat;
use rampay_config::{
    Config,
    figment::{
        self, Metadata, Profile,
        providers::Serialized,
        value::{Dict, Map},
    },
};
use serde::Serialize;
use std::path::PathBuf;

/// Options shared by every command. Set values take precedence over the config file and the
/// environment.
#[derive(Clone, Debug, Default, Serialize, Parser)]
pub struct GlobalOpts {
    /// The JSON-RPC endpoint of the wallet provider.
    #[arg(long, short, value_name = "URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,

    /// The chain payments are accepted on.
    #[arg(long, value_name = "CHAIN_ID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,

    /// The fiat currency amounts are entered in.
    #[arg(long, value_name = "CURRENCY")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiat: Option<Fiat>,

    /// The price feed endpoint.
    #[arg(long, value_name = "URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_feed_url: Option<String>,

    /// Path to the config file. Defaults to `rampay.toml`, or `$RAMPAY_CONFIG` if set.
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    #[serde(skip)]
    pub json: bool,
}

impl figment::Provider for GlobalOpts {
    fn metadata(&self) -> Metadata {
        Metadata::named("command line arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}

impl GlobalOpts {
    /// Loads the config, with these options merged on top.
    pub fn load_config(&self) -> Result<Config> {
        let path = self.config.clone().unwrap_or_else(Config::config_path);
        let config = Config::try_from(Config::figment_from(path).merge(self.clone()))?;
        trace!(?config, "loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn cli_overrides_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file("rampay.toml", "rpc_url = \"http://file:8545\"\nchain_id = 5")?;
            jail.set_env("RAMPAY_FIAT", "usd");

            let opts = GlobalOpts::parse_from(["rampay", "--rpc-url", "http://cli:8545"]);
            let config = opts.load_config().map_err(|err| err.to_string())?;
            assert_eq!(config.rpc_url, "http://cli:8545");
            assert_eq!(config.chain_id, 5);
            assert_eq!(config.fiat, Fiat::Usd);

            let opts = GlobalOpts::parse_from(["rampay", "--fiat", "inr", "--chain-id", "1"]);
            let config = opts.load_config().map_err(|err| err.to_string())?;
            assert_eq!(config.fiat, Fiat::Inr);
            assert_eq!(config.chain_id, 1);
            assert_eq!(config.rpc_url, "http://file:8545");
            Ok(())
        });
    }

    #[test]
    fn explicit_config_file() {
        Jail::expect_with(|jail| {
            jail.create_file("pay.toml", "quote_interval = 15")?;

            let opts = GlobalOpts::parse_from(["rampay", "--config", "pay.toml"]);
            let config = opts.load_config().map_err(|err| err.to_string())?;
            assert_eq!(config.quote_interval, 15);
            Ok(())
        });
    }
}
