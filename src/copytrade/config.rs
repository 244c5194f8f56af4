//! Copy-trade settings
//!
//! Handed to the engine at construction and replaced wholesale through
//! `CopyTradeEngine::update_config`; pipelines read an immutable snapshot.

use serde::Deserialize;

use crate::pump::price::MAX_SLIPPAGE_BPS;
use crate::stream::DropPolicy;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CopyTradeConfig {
    /// Replicate detected buys; `false` pauses an armed engine
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Scales `base_slippage_bps` for replicas
    #[serde(default = "default_multiplier")]
    pub slippage_multiplier: f64,

    /// Scales the observed source spend
    #[serde(default = "default_multiplier")]
    pub sol_amount_multiplier: f64,

    /// Per-wallet replica cap in lamports
    #[serde(default = "default_max_sol_per_trade")]
    pub max_sol_per_trade: u64,

    /// Scales the source transaction's priority fee
    #[serde(default = "default_multiplier")]
    pub priority_fee_multiplier: f64,

    #[serde(default = "default_base_slippage_bps")]
    pub base_slippage_bps: u32,

    /// Notifications buffered between the subscription and the consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub drop_policy: DropPolicy,

    /// Concurrent classification pipelines
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for CopyTradeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slippage_multiplier: default_multiplier(),
            sol_amount_multiplier: default_multiplier(),
            max_sol_per_trade: default_max_sol_per_trade(),
            priority_fee_multiplier: default_multiplier(),
            base_slippage_bps: default_base_slippage_bps(),
            channel_capacity: default_channel_capacity(),
            drop_policy: DropPolicy::default(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_max_sol_per_trade() -> u64 {
    100_000_000 // 0.1 SOL
}

fn default_base_slippage_bps() -> u32 {
    1_000
}

fn default_channel_capacity() -> usize {
    256
}

fn default_max_in_flight() -> usize {
    8
}

impl CopyTradeConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("slippage_multiplier", self.slippage_multiplier),
            ("sol_amount_multiplier", self.sol_amount_multiplier),
            ("priority_fee_multiplier", self.priority_fee_multiplier),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, value));
            }
        }

        if self.max_sol_per_trade == 0 {
            return Err("max_sol_per_trade must be positive".to_string());
        }

        if self.base_slippage_bps > MAX_SLIPPAGE_BPS {
            return Err(format!(
                "base_slippage_bps cannot exceed {} (100%)",
                MAX_SLIPPAGE_BPS
            ));
        }

        if self.channel_capacity == 0 {
            return Err("channel_capacity must be positive".to_string());
        }

        if self.max_in_flight == 0 {
            return Err("max_in_flight must be positive".to_string());
        }

        Ok(())
    }
}
