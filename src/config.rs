//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::copytrade::CopyTradeConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub copy_trade: CopyTradeConfig,
    #[serde(default)]
    pub valuation: ValuationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_ws_endpoint")]
    pub ws_endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Deadline for a submitted transaction to reach `confirmed`
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Priority fee (SOL) used when a trade carries no explicit compute budget
    #[serde(default = "default_priority_fee_sol")]
    pub default_priority_fee_sol: f64,
    #[serde(default = "default_pumpportal_url")]
    pub pumpportal_url: String,
    #[serde(default = "default_pool")]
    pub pool: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            slippage_bps: default_slippage_bps(),
            default_priority_fee_sol: default_priority_fee_sol(),
            pumpportal_url: default_pumpportal_url(),
            pool: default_pool(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Directory holding one record file per managed wallet
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    /// Destination for native-balance sweeps
    #[serde(default)]
    pub treasury: Option<String>,
    /// Lamports left behind in a wallet after a sweep
    #[serde(default = "default_min_reserve_lamports")]
    pub min_reserve_lamports: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            treasury: None,
            min_reserve_lamports: default_min_reserve_lamports(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValuationConfig {
    /// Endpoint returning the SOL/USD quote
    #[serde(default = "default_price_url")]
    pub price_url: String,
    /// Field holding the quote when the endpoint returns an object
    #[serde(default = "default_price_field")]
    pub price_field: String,
    #[serde(default = "default_price_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            price_url: default_price_url(),
            price_field: default_price_field(),
            timeout_ms: default_price_timeout_ms(),
        }
    }
}

fn default_rpc_endpoint() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_ws_endpoint() -> String {
    "wss://api.mainnet-beta.solana.com".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_confirm_timeout_secs() -> u64 {
    45
}

fn default_confirm_poll_ms() -> u64 {
    500
}

fn default_slippage_bps() -> u32 {
    500
}

fn default_priority_fee_sol() -> f64 {
    0.0005
}

fn default_pumpportal_url() -> String {
    "https://pumpportal.fun/api/trade-local".to_string()
}

fn default_pool() -> String {
    "pump".to_string()
}

fn default_storage_dir() -> String {
    "wallets".to_string()
}

fn default_min_reserve_lamports() -> u64 {
    // Rent-exempt minimum plus one transfer fee
    895_880 + 5_000
}

fn default_price_url() -> String {
    "https://frontend-api-v3.pump.fun/sol-price".to_string()
}

fn default_price_field() -> String {
    "solPrice".to_string()
}

fn default_price_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.ws_endpoint", default_ws_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix PUMPCOPY_)
            .add_source(
                config::Environment::with_prefix("PUMPCOPY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.trading.slippage_bps > 10_000 {
            anyhow::bail!("slippage_bps cannot exceed 10000 (100%)");
        }

        if self.trading.default_priority_fee_sol < 0.0 {
            anyhow::bail!("default_priority_fee_sol cannot be negative");
        }

        if self.rpc.confirm_timeout_secs == 0 {
            anyhow::bail!("confirm_timeout_secs must be positive");
        }

        if let Some(treasury) = &self.wallet.treasury {
            if treasury.len() < 32 || treasury.len() > 44 {
                anyhow::bail!("Invalid treasury address: {}", treasury);
            }
        }

        self.copy_trade
            .validate()
            .map_err(|e| anyhow::anyhow!("copy_trade: {}", e))?;

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    ws_endpoint: {}
    timeout: {}ms
    confirm_timeout: {}s
  Trading:
    slippage: {}bps
    default_priority_fee: {} SOL
    pumpportal: {}
  Wallet:
    storage_dir: {}
    treasury: {}
    min_reserve: {} lamports
  Copy-Trade:
    sol_multiplier: {}
    max_sol_per_trade: {} lamports
    slippage_multiplier: {}
    priority_fee_multiplier: {}
    channel: {} ({:?})
  Valuation:
    price_url: {}
"#,
            mask_url(&self.rpc.endpoint),
            mask_url(&self.rpc.ws_endpoint),
            self.rpc.timeout_ms,
            self.rpc.confirm_timeout_secs,
            self.trading.slippage_bps,
            self.trading.default_priority_fee_sol,
            mask_url(&self.trading.pumpportal_url),
            self.wallet.storage_dir,
            self.wallet.treasury.as_deref().unwrap_or("(not set)"),
            self.wallet.min_reserve_lamports,
            self.copy_trade.sol_amount_multiplier,
            self.copy_trade.max_sol_per_trade,
            self.copy_trade.slippage_multiplier,
            self.copy_trade.priority_fee_multiplier,
            self.copy_trade.channel_capacity,
            self.copy_trade.drop_policy,
            mask_url(&self.valuation.price_url),
        )
    }
}

/// Mask API keys embedded in URLs
fn mask_url(url: &str) -> String {
    match url.find('?') {
        Some(idx) => format!("{}?***", &url[..idx]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com/?api-key=secret"),
            "https://rpc.example.com/?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }

    #[test]
    fn test_load_defaults_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[rpc]
endpoint = "https://rpc.example.com/?api-key=abc"

[copy_trade]
sol_amount_multiplier = 0.5
max_sol_per_trade = 100000000
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.trading.slippage_bps, 500);
        assert_eq!(config.copy_trade.max_sol_per_trade, 100_000_000);
        assert!((config.copy_trade.sol_amount_multiplier - 0.5).abs() < f64::EPSILON);
        assert!(config.masked_display().contains("?***"));
        assert!(!config.masked_display().contains("abc"));
    }

    #[test]
    fn test_rejects_excess_slippage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[rpc]\n\n[trading]\nslippage_bps = 20000\n").unwrap();

        assert!(Config::load(&path).is_err());
    }
}
