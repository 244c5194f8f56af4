//! Pump.fun program constants
//!
//! # WARNING: These constants may change without notice
//! Pump.fun has historically modified their program behavior.
//! If log classification or curve decoding breaks, these values
//! may need to be updated.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Pump.fun program ID
pub const PUMP_PROGRAM_ID_STR: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// Seed for the per-mint bonding curve PDA
pub const BONDING_CURVE_SEED: &[u8] = b"bonding-curve";

/// Solana base fee charged per signature, in lamports
pub const BASE_FEE_PER_SIGNATURE: u64 = 5_000;

lazy_static::lazy_static! {
    /// Pump.fun program ID as Pubkey
    pub static ref PUMP_PROGRAM_ID: Pubkey =
        Pubkey::from_str(PUMP_PROGRAM_ID_STR).expect("Invalid pump program ID");
}

/// Account discriminators (first 8 bytes of account data)
/// Calculated as: SHA-256("account:<AccountName>")[0..8]
#[allow(non_snake_case)]
pub mod ACCOUNT_DISCRIMINATORS {
    /// BondingCurve account discriminator
    pub const BONDING_CURVE: [u8; 8] = [23, 183, 248, 55, 96, 216, 172, 96];
}

/// Derive the bonding curve PDA for a mint
pub fn derive_bonding_curve(mint: &Pubkey) -> Pubkey {
    let seeds = &[BONDING_CURVE_SEED, mint.as_ref()];
    Pubkey::find_program_address(seeds, &PUMP_PROGRAM_ID).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    /// Anchor account discriminator for an account name
    fn account_discriminator(name: &str) -> [u8; 8] {
        let hash = Sha256::digest(format!("account:{}", name).as_bytes());
        let mut discriminator = [0u8; 8];
        discriminator.copy_from_slice(&hash[..8]);
        discriminator
    }

    #[test]
    fn test_bonding_curve_discriminator() {
        assert_eq!(
            account_discriminator("BondingCurve"),
            ACCOUNT_DISCRIMINATORS::BONDING_CURVE
        );
    }

    #[test]
    fn test_program_id() {
        assert_eq!(PUMP_PROGRAM_ID.to_string(), PUMP_PROGRAM_ID_STR);
    }

    #[test]
    fn test_bonding_curve_pda_is_deterministic() {
        let mint = Pubkey::new_unique();
        assert_eq!(derive_bonding_curve(&mint), derive_bonding_curve(&mint));
        assert_ne!(derive_bonding_curve(&mint), derive_bonding_curve(&Pubkey::new_unique()));
    }
}
