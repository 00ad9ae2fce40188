pub mod build;
pub mod decode;
pub mod utxos;

use crate::config::AppConfig;
use anyhow::Context;
use clap::{Args, ValueEnum};

/// How command results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Configuration file (default: ./config.toml)
    #[arg(long, default_value = "config")]
    pub config: String,

    /// Network (overrides config.toml): bitcoin, testnet, signet, regtest
    #[arg(long)]
    pub network: Option<String>,
}

impl ConfigArgs {
    pub fn load(&self) -> anyhow::Result<AppConfig> {
        let mut config = AppConfig::load_from(&self.config)
            .with_context(|| format!("Failed to load configuration from {}", self.config))?;
        if let Some(network) = &self.network {
            config.network = network.clone();
            config
                .bitcoin_network()
                .with_context(|| format!("Unsupported --network {}", network))?;
        }
        Ok(config)
    }
}
