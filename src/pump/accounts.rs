//! Pump.fun account structures
//!
//! # WARNING: These structures may change without notice
//! Pump.fun has modified their account layouts in the past.
//! If deserialization fails, these structures may need updating.

use borsh::{BorshDeserialize, BorshSerialize};

use super::price::{lamports_to_sol, tokens_to_human, DEFAULT_TOKEN_DECIMALS};
use super::program::ACCOUNT_DISCRIMINATORS;
use crate::error::{Error, Result};

/// BondingCurve account - stores the bonding curve state for a token
///
/// Newer curves append fields (creator, ...) after `complete`; decoding
/// reads the known prefix and ignores the rest.
#[derive(Debug, Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BondingCurve {
    /// Virtual token reserves for price calculation
    pub virtual_token_reserves: u64,

    /// Virtual SOL reserves for price calculation
    pub virtual_sol_reserves: u64,

    /// Real token reserves (actual tokens held in bonding curve)
    pub real_token_reserves: u64,

    /// Real SOL reserves (actual SOL held in bonding curve)
    pub real_sol_reserves: u64,

    /// Total supply of the token
    pub token_total_supply: u64,

    /// Whether the bonding curve is complete (migrated off the curve)
    pub complete: bool,
}

impl BondingCurve {
    pub fn new(
        virtual_token_reserves: u64,
        virtual_sol_reserves: u64,
        token_total_supply: u64,
    ) -> Self {
        Self {
            virtual_token_reserves,
            virtual_sol_reserves,
            real_token_reserves: 0,
            real_sol_reserves: 0,
            token_total_supply,
            complete: false,
        }
    }

    /// Deserialize from raw account data (discriminator included)
    pub fn try_from_account_data(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::BondingCurveDecode(
                "Account data too short".to_string(),
            ));
        }

        if data[..8] != ACCOUNT_DISCRIMINATORS::BONDING_CURVE {
            return Err(Error::BondingCurveDecode(format!(
                "Wrong discriminator: expected {:?}, got {:?}",
                ACCOUNT_DISCRIMINATORS::BONDING_CURVE,
                &data[..8]
            )));
        }

        let mut body = &data[8..];
        BondingCurve::deserialize(&mut body)
            .map_err(|e| Error::BondingCurveDecode(format!("Borsh decode failed: {}", e)))
    }

    /// Spot price of one whole token in SOL
    pub fn price_sol_per_token(&self) -> Result<f64> {
        if self.virtual_token_reserves == 0 {
            return Err(Error::Valuation(
                "bonding curve has zero virtual token reserves".to_string(),
            ));
        }

        let sol = lamports_to_sol(self.virtual_sol_reserves);
        let tokens = tokens_to_human(self.virtual_token_reserves, DEFAULT_TOKEN_DECIMALS);
        Ok(sol / tokens)
    }

    /// Market cap in SOL for a given raw total supply
    pub fn market_cap_sol(&self, total_supply: u64) -> Result<f64> {
        let price = self.price_sol_per_token()?;
        Ok(price * tokens_to_human(total_supply, DEFAULT_TOKEN_DECIMALS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(curve: &BondingCurve, trailing: &[u8]) -> Vec<u8> {
        let mut data = ACCOUNT_DISCRIMINATORS::BONDING_CURVE.to_vec();
        data.extend(borsh::to_vec(curve).unwrap());
        data.extend_from_slice(trailing);
        data
    }

    #[test]
    fn test_decode_ignores_trailing_fields() {
        let curve = BondingCurve::new(1_073_000_000_000_000, 30_000_000_000, 1_000_000_000_000_000);
        let data = encoded(&curve, &[7u8; 32]);

        let decoded = BondingCurve::try_from_account_data(&data).unwrap();
        assert_eq!(decoded, curve);
    }

    #[test]
    fn test_decode_rejects_wrong_discriminator() {
        let curve = BondingCurve::new(1, 1, 1);
        let mut data = encoded(&curve, &[]);
        data[0] ^= 0xff;

        assert!(matches!(
            BondingCurve::try_from_account_data(&data),
            Err(Error::BondingCurveDecode(_))
        ));
    }

    #[test]
    fn test_market_cap_sol() {
        // 30 SOL against 1_000 whole tokens -> 0.03 SOL per token
        let curve = BondingCurve::new(1_000_000_000, 30_000_000_000, 1_000_000_000);
        let price = curve.price_sol_per_token().unwrap();
        assert!((price - 0.03).abs() < 1e-12);

        let mcap = curve.market_cap_sol(1_000_000_000).unwrap();
        assert!((mcap - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_virtual_tokens_is_error() {
        let curve = BondingCurve::new(0, 30_000_000_000, 1_000_000_000);
        assert!(matches!(curve.price_sol_per_token(), Err(Error::Valuation(_))));
    }
}
