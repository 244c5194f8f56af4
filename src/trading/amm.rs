//! Bonding-curve AMM access
//!
//! `PumpPortalAmm` builds swaps through the PumpPortal local-transaction API
//! (https://pumpportal.fun/trading-api/), signs them locally and submits them
//! through `SolanaChain`. Curve state and supply are read directly on-chain.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::VersionedTransaction,
};
use tracing::{debug, info};

use super::chain::{SolanaChain, SwapOutcome};
use super::types::PriorityFee;
use crate::config::TradingConfig;
use crate::error::{Error, Result};
use crate::pump::price::{bps_to_percent, tokens_to_human};
use crate::pump::{derive_bonding_curve, lamports_to_sol, BondingCurve, DEFAULT_TOKEN_DECIMALS};

/// Swap and curve queries against the bonding-curve AMM
///
/// `Ok(SwapOutcome::Rejected)` means the venue or the program refused the
/// swap. `Err` means the call never reached a verdict.
#[async_trait]
pub trait AmmClient: Send + Sync {
    /// Spend `lamports` of SOL on `mint`
    async fn buy(
        &self,
        payer: &Keypair,
        mint: &Pubkey,
        lamports: u64,
        slippage_bps: u32,
        priority_fee: Option<PriorityFee>,
    ) -> Result<SwapOutcome>;

    /// Sell `ui_amount` whole tokens of `mint`
    async fn sell(
        &self,
        payer: &Keypair,
        mint: &Pubkey,
        ui_amount: f64,
        slippage_bps: u32,
    ) -> Result<SwapOutcome>;

    /// Current bonding curve state for `mint`
    async fn bonding_curve(&self, mint: &Pubkey) -> Result<BondingCurve>;

    /// Raw total supply of `mint`
    async fn total_supply(&self, mint: &Pubkey) -> Result<u64>;
}

/// Trade action
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// Local trade request (returns an unsigned transaction)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTradeRequest {
    pub action: TradeAction,
    pub mint: String,
    /// SOL for buys, whole tokens for sells
    pub amount: String,
    pub denominated_in_sol: String,
    /// Whole percent
    pub slippage: u32,
    /// Priority fee in SOL
    pub priority_fee: f64,
    pub public_key: String,
    pub pool: String,
}

/// `AmmClient` backed by PumpPortal transaction building
pub struct PumpPortalAmm {
    http: Client,
    chain: Arc<SolanaChain>,
    endpoint: String,
    pool: String,
    default_priority_fee_sol: f64,
}

impl PumpPortalAmm {
    pub fn new(chain: Arc<SolanaChain>, config: &TradingConfig) -> Self {
        Self {
            http: Client::new(),
            chain,
            endpoint: config.pumpportal_url.clone(),
            pool: config.pool.clone(),
            default_priority_fee_sol: config.default_priority_fee_sol,
        }
    }

    fn priority_fee_sol(&self, priority_fee: Option<PriorityFee>) -> f64 {
        priority_fee
            .map(|fee| lamports_to_sol(fee.total_lamports()))
            .unwrap_or(self.default_priority_fee_sol)
    }

    async fn build_sign_submit(
        &self,
        payer: &Keypair,
        request: LocalTradeRequest,
    ) -> Result<SwapOutcome> {
        debug!(
            "Requesting {:?} transaction for {} ({} @ {}%)",
            request.action, request.mint, request.amount, request.slippage
        );

        let response = self.http.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::Http(format!("PumpPortal returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(SwapOutcome::Rejected(format!(
                "PumpPortal refused trade ({}): {}",
                status,
                body.trim()
            )));
        }

        let bytes = response.bytes().await?;
        let unsigned: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| Error::Serialization(format!("Invalid transaction from PumpPortal: {}", e)))?;

        let signed = VersionedTransaction::try_new(unsigned.message, &[payer])
            .map_err(|e| Error::InvalidKeypair(format!("Signing failed: {}", e)))?;

        self.chain.submit(&signed).await
    }
}

#[async_trait]
impl AmmClient for PumpPortalAmm {
    async fn buy(
        &self,
        payer: &Keypair,
        mint: &Pubkey,
        lamports: u64,
        slippage_bps: u32,
        priority_fee: Option<PriorityFee>,
    ) -> Result<SwapOutcome> {
        let request = LocalTradeRequest {
            action: TradeAction::Buy,
            mint: mint.to_string(),
            amount: lamports_to_sol(lamports).to_string(),
            denominated_in_sol: "true".to_string(),
            slippage: bps_to_percent(slippage_bps),
            priority_fee: self.priority_fee_sol(priority_fee),
            public_key: payer.pubkey().to_string(),
            pool: self.pool.clone(),
        };

        info!("Executing buy: {} SOL for token {}", request.amount, mint);
        self.build_sign_submit(payer, request).await
    }

    async fn sell(
        &self,
        payer: &Keypair,
        mint: &Pubkey,
        ui_amount: f64,
        slippage_bps: u32,
    ) -> Result<SwapOutcome> {
        let request = LocalTradeRequest {
            action: TradeAction::Sell,
            mint: mint.to_string(),
            amount: ui_amount.to_string(),
            denominated_in_sol: "false".to_string(),
            slippage: bps_to_percent(slippage_bps),
            priority_fee: self.default_priority_fee_sol,
            public_key: payer.pubkey().to_string(),
            pool: self.pool.clone(),
        };

        info!("Executing sell: {} of token {}", request.amount, mint);
        self.build_sign_submit(payer, request).await
    }

    async fn bonding_curve(&self, mint: &Pubkey) -> Result<BondingCurve> {
        let address = derive_bonding_curve(mint);
        let data = self.chain.rpc().get_account_data(&address).await?;
        BondingCurve::try_from_account_data(&data)
    }

    async fn total_supply(&self, mint: &Pubkey) -> Result<u64> {
        let supply = self.chain.rpc().get_token_supply(mint).await?;
        supply
            .amount
            .parse()
            .map_err(|e| Error::Rpc(format!("Unparseable supply {:?}: {}", supply.amount, e)))
    }
}

/// Raw token amount in whole tokens, assuming pump.fun's six decimals
pub fn raw_to_ui_amount(raw: u64) -> f64 {
    tokens_to_human(raw, DEFAULT_TOKEN_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_trade_request_serialization() {
        let request = LocalTradeRequest {
            action: TradeAction::Buy,
            mint: "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK".to_string(),
            amount: lamports_to_sol(10_000_000).to_string(),
            denominated_in_sol: "true".to_string(),
            slippage: bps_to_percent(2_500),
            priority_fee: 0.0005,
            public_key: "payer".to_string(),
            pool: "pump".to_string(),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"action\":\"buy\""));
        assert!(json.contains("\"amount\":\"0.01\""));
        assert!(json.contains("\"denominatedInSol\":\"true\""));
        assert!(json.contains("\"slippage\":25"));
        assert!(json.contains("\"publicKey\":\"payer\""));
    }

    #[test]
    fn test_raw_to_ui_amount_assumes_six_decimals() {
        assert_eq!(raw_to_ui_amount(2_500_000), 2.5);
        assert_eq!(raw_to_ui_amount(0), 0.0);
    }
}
