//! Unit conversion utilities for pump.fun trades

/// Token decimals - pump.fun uses 6 decimals (not Solana's standard 9)
/// WARNING: sells convert raw amounts with this constant instead of reading
/// the mint's decimals; tokens with other precisions are mis-sized.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

/// SOL decimals (lamports)
pub const SOL_DECIMALS: u8 = 9;

/// Maximum slippage in basis points (100%)
pub const MAX_SLIPPAGE_BPS: u32 = 10_000;

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / 10f64.powi(SOL_DECIMALS as i32)
}

/// Convert SOL to lamports
pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * 10f64.powi(SOL_DECIMALS as i32)) as u64
}

/// Convert token amount to human-readable (with decimals)
pub fn tokens_to_human(amount: u64, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

/// Basis points to the whole-percent slippage PumpPortal expects (rounded up)
pub fn bps_to_percent(slippage_bps: u32) -> u32 {
    slippage_bps.div_ceil(100)
}

/// Scale a basis-point slippage by a multiplier, capped at 100%
pub fn scale_slippage_bps(base_bps: u32, multiplier: f64) -> u32 {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return 0;
    }
    let scaled = (base_bps as f64 * multiplier).round();
    if scaled >= MAX_SLIPPAGE_BPS as f64 {
        MAX_SLIPPAGE_BPS
    } else {
        scaled as u32
    }
}
