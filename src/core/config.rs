//! Configuration - Type-safe, validated config
//!
//! Loads from `shadeswap.toml`, then applies `SHADESWAP_*` environment
//! overrides (a `.env` file is honoured).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::core::{ChainId, Error, Result, SAPPHIRE_TESTNET_ID, Token};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub trading: TradingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Expected chain id
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Persona contract address (unset = simulation)
    #[serde(default)]
    pub contract_address: Option<String>,

    /// Refuse to start on chains without confidential compute
    #[serde(default)]
    pub require_confidential: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Fraction shaved off the input by the illustrative pricer (0.02 = 2%)
    #[serde(default = "default_slippage_rate")]
    pub slippage_rate: f64,

    /// Demo token list offered by the front end
    #[serde(default = "default_tokens")]
    pub tokens: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_chain_id() -> u64 {
    SAPPHIRE_TESTNET_ID
}
fn default_rpc_url() -> String {
    "https://testnet.sapphire.oasis.dev".to_string()
}
fn default_slippage_rate() -> f64 {
    0.02
}
fn default_tokens() -> Vec<String> {
    ["ETH", "DAI", "USDC", "WBTC", "UNI"].iter().map(|s| s.to_string()).collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            rpc_url: default_rpc_url(),
            contract_address: None,
            require_confidential: false,
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            slippage_rate: default_slippage_rate(),
            tokens: default_tokens(),
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists (defaults otherwise), then apply env overrides
    pub fn load_or_default(path: &Path) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = if path.exists() {
            let cfg = Self::load(path)?;
            tracing::info!("Loaded config from {}", path.display());
            cfg
        } else {
            tracing::warn!("No {} found, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHADESWAP_*` overrides from a variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("SHADESWAP_CHAIN_ID") {
            self.network.chain_id = v
                .parse()
                .map_err(|_| Error::Config(format!("SHADESWAP_CHAIN_ID is not a number: {}", v)))?;
        }
        if let Some(v) = lookup("SHADESWAP_CONTRACT_ADDR") {
            self.network.contract_address = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("SHADESWAP_SLIPPAGE_RATE") {
            self.trading.slippage_rate = v
                .parse()
                .map_err(|_| Error::Config(format!("SHADESWAP_SLIPPAGE_RATE is not a number: {}", v)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let rate = self.trading.slippage_rate;
        if !(0.0..1.0).contains(&rate) {
            return Err(Error::Config(format!("slippage_rate must be in [0, 1), got {}", rate)));
        }
        if self.network.require_confidential && !self.chain_id().is_confidential() {
            return Err(Error::UnsupportedChain(self.network.chain_id));
        }
        Ok(())
    }

    pub fn chain_id(&self) -> ChainId {
        ChainId(self.network.chain_id)
    }

    /// Slippage rate as an exact decimal (0.02 stays 0.02)
    pub fn slippage_rate(&self) -> Result<Decimal> {
        Decimal::from_str(&self.trading.slippage_rate.to_string())
            .map_err(|e| Error::Config(format!("bad slippage_rate: {}", e)))
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.trading.tokens.iter().map(|s| Token::new(s.as_str())).collect()
    }
}
