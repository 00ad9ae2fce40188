use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Engine configuration loaded from config.toml or environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub network: String,
    pub resolver: ResolverConfig,
    pub counterparty: CounterpartyConfig,
    pub dust: DustConfig,
    pub protocol: ProtocolConfig,
    pub service_fee: ServiceFeeConfig,
}

/// Response shape spoken by a chain-data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Esplora API as served by mempool.space
    Mempool,
    /// Esplora API as served by blockstream.info
    Blockstream,
    BlockchainInfo,
    Blockcypher,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
}

/// Coin resolver failover and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Queried in order on every attempt
    pub providers: Vec<ProviderEndpoint>,
    /// Full passes over the provider list
    pub max_attempts: usize,
    /// Delay before pass `n + 1` is `n * backoff_step_ms`
    pub backoff_step_ms: u64,
    pub request_timeout_seconds: u64,
    /// Parallel previous-transaction lookups during assembly
    pub prev_tx_concurrency: usize,
}

/// Counterparty API v2 nodes used to find protocol-bearing coins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterpartyConfig {
    pub nodes: Vec<String>,
    pub page_limit: usize,
    pub max_pages: usize,
}

/// Output values in satoshis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DustConfig {
    /// Recipient marker output
    pub recipient: u64,
    /// Every bare-multisig data output
    pub multisig: u64,
    /// First witness-hash data output; chunk `i` carries `base + i`
    pub witness_hash_base: u64,
    /// Change at or below this is folded into the fee
    pub change_floor: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub prefix: String,
    /// Third key of every 1-of-3 data output (33 bytes, hex)
    pub filler_pubkey: String,
    pub max_point_attempts: usize,
    pub multisig_chunk_size: usize,
    pub witness_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceFeeConfig {
    pub enabled: bool,
    pub address: String,
    pub amount_sats: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderEndpoint {
                    name: "mempool.space".to_string(),
                    kind: ProviderKind::Mempool,
                    base_url: "https://mempool.space/api".to_string(),
                },
                ProviderEndpoint {
                    name: "blockstream.info".to_string(),
                    kind: ProviderKind::Blockstream,
                    base_url: "https://blockstream.info/api".to_string(),
                },
                ProviderEndpoint {
                    name: "blockchain.info".to_string(),
                    kind: ProviderKind::BlockchainInfo,
                    base_url: "https://blockchain.info".to_string(),
                },
                ProviderEndpoint {
                    name: "blockcypher".to_string(),
                    kind: ProviderKind::Blockcypher,
                    base_url: "https://api.blockcypher.com".to_string(),
                },
            ],
            max_attempts: 3,
            backoff_step_ms: 1000,
            request_timeout_seconds: 15,
            prev_tx_concurrency: 4,
        }
    }
}

impl Default for CounterpartyConfig {
    fn default() -> Self {
        Self {
            nodes: vec![
                "https://api.counterparty.io:4000/v2".to_string(),
                "https://dev.counterparty.io:4000/v2".to_string(),
            ],
            page_limit: 1000,
            max_pages: 100,
        }
    }
}

impl Default for DustConfig {
    fn default() -> Self {
        Self {
            recipient: 789,
            multisig: 809,
            witness_hash_base: 420,
            change_floor: 1000,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            prefix: "stamp:".to_string(),
            filler_pubkey: "020202020202020202020202020202020202020202020202020202020202020202"
                .to_string(),
            max_point_attempts: 1000,
            multisig_chunk_size: 62,
            witness_chunk_size: 32,
        }
    }
}

impl Default for ServiceFeeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: String::new(),
            amount_sats: 0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: "bitcoin".to_string(),
            resolver: ResolverConfig::default(),
            counterparty: CounterpartyConfig::default(),
            dust: DustConfig::default(),
            protocol: ProtocolConfig::default(),
            service_fee: ServiceFeeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config.toml file and environment variables
    /// Environment variables take precedence over file configuration
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration using `path` (without extension) as the optional file source
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .add_source(Config::try_from(&AppConfig::default())?)
            // Load from config.toml if it exists
            .add_source(File::with_name(path).required(false))
            // STAMP_ENGINE_DUST__CHANGE_FLOOR=2000 overrides dust.change_floor
            .add_source(
                Environment::with_prefix("STAMP_ENGINE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Parsed bitcoin network
    pub fn bitcoin_network(&self) -> Result<bitcoin::Network, ConfigError> {
        bitcoin::Network::from_str(&self.network)
            .map_err(|e| ConfigError::Message(format!("Unknown network '{}': {}", self.network, e)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.bitcoin_network()?;

        if self.resolver.providers.is_empty() {
            return Err(ConfigError::Message(
                "At least one chain data provider must be configured".to_string(),
            ));
        }
        if self.resolver.max_attempts == 0 {
            return Err(ConfigError::Message(
                "resolver.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.protocol.multisig_chunk_size != 62 {
            return Err(ConfigError::Message(format!(
                "protocol.multisig_chunk_size must be 62 (two 31-byte key halves), got {}",
                self.protocol.multisig_chunk_size
            )));
        }
        if self.protocol.witness_chunk_size != 32 {
            return Err(ConfigError::Message(format!(
                "protocol.witness_chunk_size must be 32 (one witness program), got {}",
                self.protocol.witness_chunk_size
            )));
        }
        match hex::decode(&self.protocol.filler_pubkey) {
            Ok(bytes) if bytes.len() == 33 => {}
            _ => {
                return Err(ConfigError::Message(
                    "protocol.filler_pubkey must be 33 bytes of hex".to_string(),
                ))
            }
        }
        if self.service_fee.enabled && self.service_fee.address.is_empty() {
            return Err(ConfigError::Message(
                "service_fee.address is required when the service fee is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
