//! Multi-wallet orchestration
//!
//! Fans a trade out across wallets one at a time, continuing past failures,
//! and sweeps a wallet's holdings back to the treasury. Batches share one
//! RPC connection, so a submission lock keeps them from interleaving.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::executor::TradeExecutor;
use super::types::{BatchTradeOutcome, PriorityFee, TradeErrorKind, TradeRequest, TradeResult};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::wallet::short_id;

/// Where and how sweeps move funds
#[derive(Debug, Clone)]
pub struct SweepPolicy {
    pub treasury: Option<Pubkey>,
    /// Lamports left in the wallet after the native transfer
    pub min_reserve_lamports: u64,
    /// Slippage for the full-balance token sells
    pub slippage_bps: u32,
}

impl SweepPolicy {
    pub fn from_config(config: &Config) -> Result<Self> {
        let treasury = config
            .wallet
            .treasury
            .as_deref()
            .map(|address| {
                Pubkey::from_str(address)
                    .map_err(|e| Error::Config(format!("Invalid treasury {}: {}", address, e)))
            })
            .transpose()?;

        Ok(Self {
            treasury,
            min_reserve_lamports: config.wallet.min_reserve_lamports,
            slippage_bps: config.trading.slippage_bps,
        })
    }
}

/// Result of the native-balance leg of a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeSweep {
    Transferred { lamports: u64, signature: String },
    BelowReserve { balance: u64 },
    Failed(String),
}

/// What a sweep did for one wallet
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub wallet_id: String,
    pub token_results: Vec<(String, TradeResult)>,
    /// Set when the holdings lookup failed and no token was sold
    pub holdings_error: Option<String>,
    pub native: NativeSweep,
}

impl SweepReport {
    pub fn token_failures(&self) -> usize {
        self.token_results.iter().filter(|(_, r)| !r.success).count()
    }

    /// True when holdings were listed, every token sold and the native leg did not fail
    pub fn is_clean(&self) -> bool {
        self.holdings_error.is_none()
            && self.token_failures() == 0
            && !matches!(self.native, NativeSweep::Failed(_))
    }
}

/// Sequential, continue-on-error trading across managed wallets
pub struct BatchTradeOrchestrator {
    executor: TradeExecutor,
    policy: SweepPolicy,
    submission: Mutex<()>,
}

impl BatchTradeOrchestrator {
    pub fn new(executor: TradeExecutor, policy: SweepPolicy) -> Self {
        Self {
            executor,
            policy,
            submission: Mutex::new(()),
        }
    }

    pub fn executor(&self) -> &TradeExecutor {
        &self.executor
    }

    /// Buy `mint` with `sol_amount` lamports from each wallet in order
    ///
    /// Returns exactly one result per id, in input order.
    pub async fn execute_across_wallets(
        &self,
        wallet_ids: &[String],
        mint: &str,
        sol_amount: u64,
        slippage_bps: u32,
        priority_fee: Option<PriorityFee>,
    ) -> BatchTradeOutcome {
        let _submission = self.submission.lock().await;
        self.buy_each(wallet_ids, mint, sol_amount, slippage_bps, priority_fee)
            .await
    }

    /// `execute_across_wallets` that runs only if `gate` is still set once
    /// the submission lock is held
    ///
    /// Returns `None` when the gate was cleared while waiting behind another batch.
    pub async fn execute_if_enabled(
        &self,
        gate: &AtomicBool,
        wallet_ids: &[String],
        mint: &str,
        sol_amount: u64,
        slippage_bps: u32,
        priority_fee: Option<PriorityFee>,
    ) -> Option<BatchTradeOutcome> {
        let _submission = self.submission.lock().await;
        if !gate.load(Ordering::SeqCst) {
            return None;
        }

        Some(
            self.buy_each(wallet_ids, mint, sol_amount, slippage_bps, priority_fee)
                .await,
        )
    }

    async fn buy_each(
        &self,
        wallet_ids: &[String],
        mint: &str,
        sol_amount: u64,
        slippage_bps: u32,
        priority_fee: Option<PriorityFee>,
    ) -> BatchTradeOutcome {
        let batch_id = Uuid::new_v4();

        info!(
            "Batch {} buying {} with {} lamports across {} wallets",
            batch_id,
            mint,
            sol_amount,
            wallet_ids.len()
        );

        let mut results = Vec::with_capacity(wallet_ids.len());
        for wallet_id in wallet_ids {
            let request = TradeRequest {
                wallet_id: wallet_id.clone(),
                mint: mint.to_string(),
                sol_amount,
                slippage_bps,
                priority_fee,
            };
            results.push(self.executor.buy(&request).await);
        }

        let outcome = BatchTradeOutcome::from_results(results);
        log_outcome(&batch_id, &outcome);
        outcome
    }

    /// Sell each wallet's full balance of `mint`
    pub async fn sell_across_wallets(
        &self,
        wallet_ids: &[String],
        mint: &str,
        slippage_bps: u32,
    ) -> BatchTradeOutcome {
        let _submission = self.submission.lock().await;
        let batch_id = Uuid::new_v4();

        info!(
            "Batch {} selling {} across {} wallets",
            batch_id,
            mint,
            wallet_ids.len()
        );

        let mut results = Vec::with_capacity(wallet_ids.len());
        for wallet_id in wallet_ids {
            results.push(self.sell_full_balance(wallet_id, mint, slippage_bps).await);
        }

        let outcome = BatchTradeOutcome::from_results(results);
        log_outcome(&batch_id, &outcome);
        outcome
    }

    async fn sell_full_balance(&self, wallet_id: &str, mint: &str, slippage_bps: u32) -> TradeResult {
        let Some(owner) = self.owner_of(wallet_id) else {
            return TradeResult::failed(wallet_id, TradeErrorKind::WalletNotFound);
        };

        let mint_key = match Pubkey::from_str(mint) {
            Ok(key) => key,
            Err(e) => {
                return TradeResult::failed(
                    wallet_id,
                    TradeErrorKind::InvalidRequest(format!("invalid mint {}: {}", mint, e)),
                )
            }
        };

        match self.executor.chain().token_balance(&owner, &mint_key).await {
            Ok(0) => TradeResult::failed(
                wallet_id,
                TradeErrorKind::InvalidRequest(format!("no {} balance", mint)),
            ),
            Ok(raw) => self.executor.sell(wallet_id, mint, raw, slippage_bps).await,
            Err(e) => TradeResult::failed(wallet_id, TradeErrorKind::TransientFailure(e.to_string())),
        }
    }

    /// Sell every token holding, then move native balance above the reserve to the treasury
    ///
    /// Token sells are best-effort; the native leg runs regardless of their outcome.
    pub async fn sweep_wallet(&self, wallet_id: &str) -> Result<SweepReport> {
        let treasury = self
            .policy
            .treasury
            .ok_or_else(|| Error::Config("No treasury configured for sweeps".to_string()))?;

        let owner = self
            .owner_of(wallet_id)
            .ok_or_else(|| Error::WalletNotFound(wallet_id.to_string()))?;

        let _submission = self.submission.lock().await;
        let chain = self.executor.chain();

        let (holdings, holdings_error) = match chain.token_holdings(&owner).await {
            Ok(holdings) => (holdings, None),
            Err(e) => {
                warn!(
                    "Sweep of {} could not list token holdings: {}",
                    short_id(wallet_id),
                    e
                );
                (Vec::new(), Some(e.to_string()))
            }
        };

        let mut token_results = Vec::new();
        for holding in holdings {
            if holding.amount == 0 {
                continue;
            }

            let result = self
                .executor
                .sell(wallet_id, &holding.mint, holding.amount, self.policy.slippage_bps)
                .await;
            if let Some(e) = &result.error {
                warn!(
                    "Sweep of {} could not sell {}: {}",
                    short_id(wallet_id),
                    holding.mint,
                    e
                );
            }
            token_results.push((holding.mint, result));
        }

        let native = self.sweep_native(wallet_id, &owner, &treasury).await;

        Ok(SweepReport {
            wallet_id: wallet_id.to_string(),
            token_results,
            holdings_error,
            native,
        })
    }

    async fn sweep_native(&self, wallet_id: &str, owner: &Pubkey, treasury: &Pubkey) -> NativeSweep {
        let chain = self.executor.chain();
        let registry = self.executor.registry();

        let balance = match chain.balance(owner).await {
            Ok(balance) => balance,
            Err(e) => return NativeSweep::Failed(e.to_string()),
        };

        if balance <= self.policy.min_reserve_lamports {
            return NativeSweep::BelowReserve { balance };
        }

        let Some(keypair) = registry.resolve_signing_material(wallet_id) else {
            return NativeSweep::Failed("signing material unavailable".to_string());
        };

        let lamports = balance - self.policy.min_reserve_lamports;
        match chain.transfer(&keypair, treasury, lamports).await {
            Ok(signature) => {
                if let Err(e) = registry.update_balance(wallet_id, self.policy.min_reserve_lamports) {
                    warn!("Failed to persist balance for {}: {}", short_id(wallet_id), e);
                }
                NativeSweep::Transferred {
                    lamports,
                    signature: signature.to_string(),
                }
            }
            Err(e) => NativeSweep::Failed(e.to_string()),
        }
    }

    /// Full sweep collapsed to one flag: false if any token sell or the native transfer failed
    pub async fn transfer_all_assets(&self, wallet_id: &str) -> bool {
        match self.sweep_wallet(wallet_id).await {
            Ok(report) => {
                info!(
                    "Sweep of {}: {} tokens attempted, {} failed, native {:?}",
                    short_id(wallet_id),
                    report.token_results.len(),
                    report.token_failures(),
                    report.native
                );
                report.is_clean()
            }
            Err(e) => {
                error!("Sweep of {} failed: {}", short_id(wallet_id), e);
                false
            }
        }
    }

    pub fn delete_wallet(&self, wallet_id: &str) -> bool {
        match self.executor.registry().delete(wallet_id) {
            Ok(removed) => removed,
            Err(e) => {
                error!("Failed to delete wallet {}: {}", short_id(wallet_id), e);
                false
            }
        }
    }

    pub fn delete_all_wallets(&self) -> bool {
        match self.executor.registry().delete_all() {
            Ok(count) => {
                info!("Deleted {} wallets", count);
                true
            }
            Err(e) => {
                error!("Failed to delete all wallets: {}", e);
                false
            }
        }
    }

    fn owner_of(&self, wallet_id: &str) -> Option<Pubkey> {
        let wallet = self.executor.registry().get(wallet_id)?;
        Pubkey::from_str(&wallet.public_key).ok()
    }
}

fn log_outcome(batch_id: &Uuid, outcome: &BatchTradeOutcome) {
    for result in outcome.per_wallet.iter().filter(|r| !r.success) {
        if let Some(e) = &result.error {
            warn!("Batch {} wallet {}: {}", batch_id, short_id(&result.wallet_id), e);
        }
    }

    info!(
        "Batch {} finished: {} succeeded, {} failed",
        batch_id,
        outcome.success_count(),
        outcome.failure_count()
    );
}
