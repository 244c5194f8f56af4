//! Single-wallet trade execution
//!
//! Every call returns a `TradeResult`; failures are normalized into
//! `TradeErrorKind` rather than raised.

use std::str::FromStr;
use std::sync::Arc;

use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use tracing::{debug, info, warn};

use super::amm::{raw_to_ui_amount, AmmClient};
use super::chain::{ChainClient, SwapOutcome};
use super::types::{TradeErrorKind, TradeRequest, TradeResult};
use crate::wallet::{short_id, WalletRegistry};

/// Executes one directional swap for one managed wallet
pub struct TradeExecutor {
    registry: Arc<WalletRegistry>,
    chain: Arc<dyn ChainClient>,
    amm: Arc<dyn AmmClient>,
}

impl TradeExecutor {
    pub fn new(
        registry: Arc<WalletRegistry>,
        chain: Arc<dyn ChainClient>,
        amm: Arc<dyn AmmClient>,
    ) -> Self {
        Self {
            registry,
            chain,
            amm,
        }
    }

    pub fn registry(&self) -> &Arc<WalletRegistry> {
        &self.registry
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    /// Buy `request.mint` with `request.sol_amount` lamports
    ///
    /// The balance preflight runs before the AMM is contacted.
    pub async fn buy(&self, request: &TradeRequest) -> TradeResult {
        let wallet_id = request.wallet_id.as_str();

        if request.sol_amount == 0 {
            return TradeResult::failed(
                wallet_id,
                TradeErrorKind::InvalidRequest("sol_amount must be positive".to_string()),
            );
        }

        let mint = match parse_mint(&request.mint) {
            Ok(mint) => mint,
            Err(kind) => return TradeResult::failed(wallet_id, kind),
        };

        let Some(payer) = self.registry.resolve_signing_material(wallet_id) else {
            return TradeResult::failed(wallet_id, TradeErrorKind::WalletNotFound);
        };

        let available = match self.chain.balance(&payer.pubkey()).await {
            Ok(lamports) => lamports,
            Err(e) => {
                return TradeResult::failed(wallet_id, TradeErrorKind::TransientFailure(e.to_string()))
            }
        };

        if available < request.sol_amount {
            debug!(
                "Wallet {} has {} lamports, trade needs {}",
                short_id(wallet_id),
                available,
                request.sol_amount
            );
            return TradeResult::failed(
                wallet_id,
                TradeErrorKind::InsufficientBalance {
                    available,
                    required: request.sol_amount,
                },
            );
        }

        let outcome = self
            .amm
            .buy(
                &payer,
                &mint,
                request.sol_amount,
                request.slippage_bps,
                request.priority_fee,
            )
            .await;

        self.finish(wallet_id, &payer, outcome).await
    }

    /// Sell `raw_amount` base units of `mint`
    ///
    /// Raw amounts are converted assuming six decimals. No balance preflight:
    /// callers pass an amount they already read from chain.
    pub async fn sell(
        &self,
        wallet_id: &str,
        mint: &str,
        raw_amount: u64,
        slippage_bps: u32,
    ) -> TradeResult {
        if raw_amount == 0 {
            return TradeResult::failed(
                wallet_id,
                TradeErrorKind::InvalidRequest("token amount must be positive".to_string()),
            );
        }

        let mint = match parse_mint(mint) {
            Ok(mint) => mint,
            Err(kind) => return TradeResult::failed(wallet_id, kind),
        };

        let Some(payer) = self.registry.resolve_signing_material(wallet_id) else {
            return TradeResult::failed(wallet_id, TradeErrorKind::WalletNotFound);
        };

        let outcome = self
            .amm
            .sell(&payer, &mint, raw_to_ui_amount(raw_amount), slippage_bps)
            .await;

        self.finish(wallet_id, &payer, outcome).await
    }

    async fn finish(
        &self,
        wallet_id: &str,
        payer: &Keypair,
        outcome: crate::Result<SwapOutcome>,
    ) -> TradeResult {
        match outcome {
            Ok(SwapOutcome::Confirmed(signature)) => {
                info!("Wallet {} trade confirmed: {}", short_id(wallet_id), signature);
                self.settle(wallet_id, payer).await;
                TradeResult::ok(wallet_id, signature.to_string())
            }
            Ok(SwapOutcome::Rejected(reason)) => {
                warn!("Wallet {} trade rejected: {}", short_id(wallet_id), reason);
                TradeResult::failed(wallet_id, TradeErrorKind::TradeRejected(reason))
            }
            Err(e) => {
                warn!("Wallet {} trade failed: {}", short_id(wallet_id), e);
                TradeResult::failed(wallet_id, TradeErrorKind::TransientFailure(e.to_string()))
            }
        }
    }

    /// Refresh and persist the post-trade balance; failures do not undo the trade
    async fn settle(&self, wallet_id: &str, payer: &Keypair) {
        let balance = match self.chain.balance(&payer.pubkey()).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Balance refresh failed for {}: {}", short_id(wallet_id), e);
                return;
            }
        };

        if let Err(e) = self.registry.update_balance(wallet_id, balance) {
            warn!("Failed to persist balance for {}: {}", short_id(wallet_id), e);
        }
    }
}

fn parse_mint(mint: &str) -> std::result::Result<Pubkey, TradeErrorKind> {
    Pubkey::from_str(mint)
        .map_err(|e| TradeErrorKind::InvalidRequest(format!("invalid mint {}: {}", mint, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeAmm, FakeChain};
    use crate::trading::types::PriorityFee;

    struct Harness {
        _dir: tempfile::TempDir,
        registry: Arc<WalletRegistry>,
        chain: Arc<FakeChain>,
        amm: Arc<FakeAmm>,
        executor: TradeExecutor,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(WalletRegistry::load(dir.path()).unwrap());
        let chain = Arc::new(FakeChain::default());
        let amm = Arc::new(FakeAmm::default());
        let executor = TradeExecutor::new(registry.clone(), chain.clone(), amm.clone());
        Harness {
            _dir: dir,
            registry,
            chain,
            amm,
            executor,
        }
    }

    fn request(wallet_id: &str, sol_amount: u64) -> TradeRequest {
        TradeRequest {
            wallet_id: wallet_id.to_string(),
            mint: Pubkey::new_unique().to_string(),
            sol_amount,
            slippage_bps: 500,
            priority_fee: Some(PriorityFee {
                unit_price: 1_000,
                unit_limit: 100_000,
            }),
        }
    }

    #[tokio::test]
    async fn test_buy_succeeds_and_persists_balance() {
        let h = harness();
        let wallet = h.registry.generate(None).unwrap();
        h.chain.set_balance(&wallet.public_key, 2_000_000_000);

        let result = h.executor.buy(&request(&wallet.public_key, 500_000_000)).await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.signature.is_some());
        assert_eq!(h.amm.buy_count(), 1);

        let stored = h.registry.get(&wallet.public_key).unwrap();
        assert_eq!(stored.cached_balance, 2_000_000_000);
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_insufficient_balance_never_reaches_amm() {
        let h = harness();
        let wallet = h.registry.generate(None).unwrap();
        h.chain.set_balance(&wallet.public_key, 100);

        for amount in [101, 1_000, 10_000_000_000] {
            let result = h.executor.buy(&request(&wallet.public_key, amount)).await;
            assert_eq!(
                result.error,
                Some(TradeErrorKind::InsufficientBalance {
                    available: 100,
                    required: amount
                })
            );
        }

        assert_eq!(h.amm.buy_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_wallet() {
        let h = harness();
        let result = h.executor.buy(&request("nope", 1)).await;
        assert_eq!(result.error, Some(TradeErrorKind::WalletNotFound));
        assert_eq!(h.amm.buy_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_amount_is_invalid() {
        let h = harness();
        let wallet = h.registry.generate(None).unwrap();
        let result = h.executor.buy(&request(&wallet.public_key, 0)).await;
        assert!(matches!(result.error, Some(TradeErrorKind::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_amm_outcomes_are_normalized() {
        let h = harness();
        let rejected = h.registry.generate(None).unwrap();
        let broken = h.registry.generate(None).unwrap();
        h.chain.set_balance(&rejected.public_key, 1_000_000_000);
        h.chain.set_balance(&broken.public_key, 1_000_000_000);
        h.amm.reject_payer(&rejected.public_key);
        h.amm.fail_payer(&broken.public_key);

        let result = h.executor.buy(&request(&rejected.public_key, 1_000)).await;
        assert!(matches!(result.error, Some(TradeErrorKind::TradeRejected(_))));

        let result = h.executor.buy(&request(&broken.public_key, 1_000)).await;
        assert!(matches!(result.error, Some(TradeErrorKind::TransientFailure(_))));
    }

    #[tokio::test]
    async fn test_balance_query_failure_is_transient() {
        let h = harness();
        let wallet = h.registry.generate(None).unwrap();
        // No balance registered: the fake chain errors

        let result = h.executor.buy(&request(&wallet.public_key, 1)).await;
        assert!(matches!(result.error, Some(TradeErrorKind::TransientFailure(_))));
        assert_eq!(h.amm.buy_count(), 0);
    }

    #[tokio::test]
    async fn test_sell_converts_with_six_decimals() {
        let h = harness();
        let wallet = h.registry.generate(None).unwrap();
        h.chain.set_balance(&wallet.public_key, 0);
        let mint = Pubkey::new_unique().to_string();

        let result = h
            .executor
            .sell(&wallet.public_key, &mint, 1_234_500_000, 300)
            .await;

        assert!(result.success);
        let sells = h.amm.sells();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].mint, mint);
        assert_eq!(sells[0].ui_amount, 1_234.5);
    }
}
