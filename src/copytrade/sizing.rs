//! Replica order sizing

use crate::pump::price::scale_slippage_bps;
use crate::pump::program::BASE_FEE_PER_SIGNATURE;
use crate::trading::{ObservedTransaction, PriorityFee};

use super::config::CopyTradeConfig;

/// A buy to place on every managed wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaOrder {
    pub mint: String,
    /// Lamports per wallet
    pub sol_amount: u64,
    pub slippage_bps: u32,
    pub priority_fee: Option<PriorityFee>,
}

/// `min(observed * sol_amount_multiplier, max_sol_per_trade)`, floored to lamports
pub fn replica_sol_amount(observed_lamports: u64, config: &CopyTradeConfig) -> u64 {
    let scaled = observed_lamports as f64 * config.sol_amount_multiplier;
    if !scaled.is_finite() || scaled <= 0.0 {
        return 0;
    }

    // `as` saturates at u64::MAX
    (scaled.floor() as u64).min(config.max_sol_per_trade)
}

/// Source priority fee per compute unit, scaled by `multiplier`
///
/// `None` when consumed compute units are unknown or zero, or the source
/// paid no priority fee.
pub fn scaled_priority_fee(
    transaction: &ObservedTransaction,
    multiplier: f64,
) -> Option<PriorityFee> {
    let units = transaction.compute_units_consumed.filter(|units| *units > 0)?;

    let base_fee = BASE_FEE_PER_SIGNATURE * transaction.signature_count.max(1) as u64;
    let priority_lamports = transaction.fee.saturating_sub(base_fee);

    let micro_lamports_per_unit = priority_lamports as f64 * 1_000_000.0 / units as f64;
    let unit_price = (micro_lamports_per_unit * multiplier).round();
    if !unit_price.is_finite() || unit_price < 1.0 {
        return None;
    }

    Some(PriorityFee {
        unit_price: unit_price as u64,
        unit_limit: units.min(u32::MAX as u64) as u32,
    })
}

/// Size the replica for a detected buy; `None` if it rounds to nothing
pub fn size_replica(
    mint: String,
    observed_lamports: u64,
    transaction: &ObservedTransaction,
    config: &CopyTradeConfig,
) -> Option<ReplicaOrder> {
    let sol_amount = replica_sol_amount(observed_lamports, config);
    if sol_amount == 0 {
        return None;
    }

    Some(ReplicaOrder {
        mint,
        sol_amount,
        slippage_bps: scale_slippage_bps(config.base_slippage_bps, config.slippage_multiplier),
        priority_fee: scaled_priority_fee(transaction, config.priority_fee_multiplier),
    })
}
