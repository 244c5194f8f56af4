//! Per-holding USD valuation cache
//!
//! Entries are keyed by (mint, owner), computed on first read and dropped
//! when a balance-change notification names their mint. Concurrent
//! invalidate and compute resolve last-write-wins.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::price::PriceQuote;
use crate::error::{Error, Result};
use crate::pump::BondingCurve;
use crate::trading::{AmmClient, ChainClient};

/// Market cap and holding value for one position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Valuation {
    pub market_cap_sol: f64,
    pub market_cap_usd: f64,
    pub value_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValuationCacheEntry {
    /// Raw token balance
    pub balance: f64,
    pub market_cap_usd: f64,
    pub value_usd: f64,
    pub last_updated: DateTime<Utc>,
}

/// Push notification that a holding changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChanged {
    pub mint: String,
}

/// Value a raw `balance` of a token with raw `total_supply`
///
/// Pure: depends only on its arguments. Degenerate inputs fail with
/// `Error::Valuation` instead of producing NaN or infinity.
pub fn compute_valuation(
    curve: &BondingCurve,
    total_supply: u64,
    balance: f64,
    sol_usd: f64,
) -> Result<Valuation> {
    if total_supply == 0 {
        return Err(Error::Valuation("total supply is zero".to_string()));
    }
    if !balance.is_finite() || balance < 0.0 {
        return Err(Error::Valuation(format!("invalid balance {}", balance)));
    }
    if !sol_usd.is_finite() || sol_usd < 0.0 {
        return Err(Error::Valuation(format!("invalid SOL price {}", sol_usd)));
    }

    let market_cap_sol = curve.market_cap_sol(total_supply)?;
    let market_cap_usd = market_cap_sol * sol_usd;
    let value_usd = market_cap_usd * (balance / total_supply as f64);

    Ok(Valuation {
        market_cap_sol,
        market_cap_usd,
        value_usd,
    })
}

/// Memoized valuations backed by the AMM, chain and price collaborators
pub struct PortfolioValuationCache {
    amm: Arc<dyn AmmClient>,
    chain: Arc<dyn ChainClient>,
    price: Arc<dyn PriceQuote>,
    entries: DashMap<(String, String), ValuationCacheEntry>,
}

impl PortfolioValuationCache {
    pub fn new(
        amm: Arc<dyn AmmClient>,
        chain: Arc<dyn ChainClient>,
        price: Arc<dyn PriceQuote>,
    ) -> Self {
        Self {
            amm,
            chain,
            price,
            entries: DashMap::new(),
        }
    }

    /// Cached valuation of `owner`'s `mint` holding, computed on a miss
    pub async fn get(&self, mint: &str, owner: &str) -> Result<ValuationCacheEntry> {
        let key = (mint.to_string(), owner.to_string());
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.clone());
        }

        let mint_key = parse_key(mint)?;
        let owner_key = parse_key(owner)?;

        let (curve, total_supply, balance, sol_usd) = futures::try_join!(
            self.amm.bonding_curve(&mint_key),
            self.amm.total_supply(&mint_key),
            self.chain.token_balance(&owner_key, &mint_key),
            self.price.sol_usd(),
        )?;

        let valuation = compute_valuation(&curve, total_supply, balance as f64, sol_usd)?;
        let entry = ValuationCacheEntry {
            balance: balance as f64,
            market_cap_usd: valuation.market_cap_usd,
            value_usd: valuation.value_usd,
            last_updated: Utc::now(),
        };

        debug!(
            "Valued {} for {}: ${:.2} of ${:.0} mcap",
            mint, owner, entry.value_usd, entry.market_cap_usd
        );
        self.entries.insert(key, entry.clone());
        Ok(entry)
    }

    /// Drop every entry for `mint`; the next read recomputes
    pub fn invalidate(&self, mint: &str) {
        self.entries.retain(|(entry_mint, _), _| entry_mint != mint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invalidate entries as balance-change notifications arrive
    pub fn spawn_invalidation_listener(
        self: &Arc<Self>,
        mut notifications: mpsc::UnboundedReceiver<BalanceChanged>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(changed) = notifications.recv().await {
                debug!("Balance changed for {}, invalidating", changed.mint);
                cache.invalidate(&changed.mint);
            }
            info!("Valuation invalidation channel closed");
        })
    }
}

fn parse_key(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address)
        .map_err(|e| Error::Valuation(format!("invalid address {}: {}", address, e)))
}
