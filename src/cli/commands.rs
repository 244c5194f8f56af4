//! CLI command implementations

use anyhow::Result;
use dialoguer::Confirm;
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::copytrade::{CopyTradeConfig, CopyTradeEngine, LogHeuristicClassifier, PubsubLogSubscriber};
use crate::pump::{lamports_to_sol, sol_to_lamports};
use crate::trading::{
    BatchTradeOrchestrator, BatchTradeOutcome, NativeSweep, PumpPortalAmm, SolanaChain, SweepPolicy,
    TradeExecutor,
};
use crate::valuation::{HttpPriceQuote, PortfolioValuationCache};
use crate::wallet::WalletRegistry;

/// Wired collaborators for one command run
struct Services {
    registry: Arc<WalletRegistry>,
    chain: Arc<SolanaChain>,
    amm: Arc<PumpPortalAmm>,
    orchestrator: Arc<BatchTradeOrchestrator>,
}

fn open_registry(config: &Config) -> Result<Arc<WalletRegistry>> {
    let registry = WalletRegistry::load(Path::new(&config.wallet.storage_dir))
        .map_err(|e| anyhow::anyhow!("Failed to load wallets: {}", e))?;
    Ok(Arc::new(registry))
}

fn services(config: &Config) -> Result<Services> {
    let registry = open_registry(config)?;
    let chain = Arc::new(SolanaChain::new(&config.rpc));
    let amm = Arc::new(PumpPortalAmm::new(chain.clone(), &config.trading));

    let executor = TradeExecutor::new(registry.clone(), chain.clone(), amm.clone());
    let orchestrator = Arc::new(BatchTradeOrchestrator::new(
        executor,
        SweepPolicy::from_config(config)?,
    ));

    Ok(Services {
        registry,
        chain,
        amm,
        orchestrator,
    })
}

/// Explicit wallet ids, or every managed wallet when none are given
fn select_wallets(registry: &WalletRegistry, wallets: Vec<String>) -> Result<Vec<String>> {
    let ids = if wallets.is_empty() {
        registry.ids()
    } else {
        wallets
    };

    if ids.is_empty() {
        anyhow::bail!("No managed wallets. Create one with `wallet create`.");
    }
    Ok(ids)
}

fn confirm(prompt: String) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

fn print_outcome(outcome: &BatchTradeOutcome) {
    println!("\n{:<46} {:<8} {}", "WALLET", "STATUS", "DETAIL");
    println!("{}", "-".repeat(100));

    for result in &outcome.per_wallet {
        let detail = match (&result.signature, &result.error) {
            (Some(signature), _) => format!("https://solscan.io/tx/{}", signature),
            (None, Some(error)) => error.to_string(),
            (None, None) => String::new(),
        };
        let status = if result.success { "OK" } else { "FAILED" };
        println!("{:<46} {:<8} {}", result.wallet_id, status, detail);
    }

    println!(
        "\n{} succeeded, {} failed\n",
        outcome.success_count(),
        outcome.failure_count()
    );
}

/// Generate and persist a new wallet
pub fn wallet_create(config: &Config, label: Option<String>) -> Result<()> {
    let registry = open_registry(config)?;
    let wallet = registry.generate(label)?;

    println!("\n=== WALLET CREATED ===");
    println!("Address: {}", wallet.public_key);
    if let Some(label) = &wallet.label {
        println!("Label:   {}", label);
    }
    println!("Record:  {}", registry.storage_dir().join(wallet.record_file_name()).display());
    println!("\nFund this address before trading.");
    Ok(())
}

/// List managed wallets in creation order
pub fn wallet_list(config: &Config) -> Result<()> {
    let registry = open_registry(config)?;

    println!("\n=== MANAGED WALLETS ===\n");
    println!("{:<46} {:<15} {:>14} {}", "ADDRESS", "LABEL", "BALANCE (SOL)", "CREATED");
    println!("{}", "-".repeat(100));

    for wallet in registry.list() {
        println!(
            "{:<46} {:<15} {:>14.6} {}",
            wallet.public_key,
            wallet.label.as_deref().unwrap_or("-"),
            lamports_to_sol(wallet.cached_balance),
            wallet.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} wallets\n", registry.len());
    Ok(())
}

/// Delete one wallet record
pub fn wallet_delete(config: &Config, wallet_id: &str, force: bool) -> Result<()> {
    let services = services(config)?;

    if !force
        && !confirm(format!(
            "Delete wallet {}? Its key is unrecoverable afterwards.",
            wallet_id
        ))?
    {
        info!("Delete cancelled by user");
        return Ok(());
    }

    if services.orchestrator.delete_wallet(wallet_id) {
        println!("Deleted wallet {}", wallet_id);
        Ok(())
    } else {
        anyhow::bail!("Wallet {} was not deleted", wallet_id)
    }
}

/// Delete every wallet record
pub fn wallet_delete_all(config: &Config, force: bool) -> Result<()> {
    let services = services(config)?;
    let count = services.registry.len();

    if !force
        && !confirm(format!(
            "Delete all {} wallets? Their keys are unrecoverable afterwards.",
            count
        ))?
    {
        info!("Delete-all cancelled by user");
        return Ok(());
    }

    if services.orchestrator.delete_all_wallets() {
        println!("Deleted {} wallets", count);
        Ok(())
    } else {
        anyhow::bail!("Some wallets could not be deleted")
    }
}

/// Sell every token in a wallet and move its SOL to the treasury
pub async fn wallet_sweep(config: &Config, wallet_id: &str, force: bool) -> Result<()> {
    let services = services(config)?;

    if !force
        && !confirm(format!(
            "Sell all tokens in {} and send its SOL to the treasury?",
            wallet_id
        ))?
    {
        info!("Sweep cancelled by user");
        return Ok(());
    }

    let report = services.orchestrator.sweep_wallet(wallet_id).await?;

    println!("\n=== SWEEP {} ===\n", wallet_id);
    if let Some(e) = &report.holdings_error {
        println!("  could not list token holdings: {}", e);
    }
    for (mint, result) in &report.token_results {
        match &result.error {
            None => println!("  sold {}", mint),
            Some(e) => println!("  FAILED {}: {}", mint, e),
        }
    }

    match &report.native {
        NativeSweep::Transferred {
            lamports,
            signature,
        } => println!(
            "  moved {} SOL to treasury (https://solscan.io/tx/{})",
            lamports_to_sol(*lamports),
            signature
        ),
        NativeSweep::BelowReserve { balance } => println!(
            "  {} SOL left, nothing above the reserve",
            lamports_to_sol(*balance)
        ),
        NativeSweep::Failed(e) => println!("  native transfer FAILED: {}", e),
    }

    if !report.is_clean() {
        anyhow::bail!("Sweep finished with failures");
    }
    Ok(())
}

/// Buy a token from the selected wallets
pub async fn buy(
    config: &Config,
    mint: &str,
    sol: f64,
    wallets: Vec<String>,
    slippage_bps: Option<u32>,
) -> Result<()> {
    if !(sol.is_finite() && sol > 0.0) {
        anyhow::bail!("SOL amount must be positive");
    }
    Pubkey::from_str(mint).map_err(|e| anyhow::anyhow!("Invalid token address: {}", e))?;

    let services = services(config)?;
    let ids = select_wallets(&services.registry, wallets)?;
    let slippage_bps = slippage_bps.unwrap_or(config.trading.slippage_bps);

    info!("Buying {} with {} SOL from {} wallets", mint, sol, ids.len());
    let outcome = services
        .orchestrator
        .execute_across_wallets(&ids, mint, sol_to_lamports(sol), slippage_bps, None)
        .await;

    print_outcome(&outcome);
    if !outcome.overall_success {
        anyhow::bail!("{} of {} buys failed", outcome.failure_count(), ids.len());
    }
    Ok(())
}

/// Sell each selected wallet's full balance of a token
pub async fn sell(
    config: &Config,
    mint: &str,
    wallets: Vec<String>,
    slippage_bps: Option<u32>,
) -> Result<()> {
    Pubkey::from_str(mint).map_err(|e| anyhow::anyhow!("Invalid token address: {}", e))?;

    let services = services(config)?;
    let ids = select_wallets(&services.registry, wallets)?;
    let slippage_bps = slippage_bps.unwrap_or(config.trading.slippage_bps);

    let outcome = services
        .orchestrator
        .sell_across_wallets(&ids, mint, slippage_bps)
        .await;

    print_outcome(&outcome);
    if !outcome.overall_success {
        anyhow::bail!("{} of {} sells failed", outcome.failure_count(), ids.len());
    }
    Ok(())
}

/// Command-line overrides for copy-trade settings
#[derive(Debug, Default, Clone)]
pub struct CopyOverrides {
    pub sol_multiplier: Option<f64>,
    pub max_sol: Option<f64>,
    pub slippage_multiplier: Option<f64>,
    pub priority_fee_multiplier: Option<f64>,
}

impl CopyOverrides {
    fn apply(self, mut config: CopyTradeConfig) -> CopyTradeConfig {
        if let Some(v) = self.sol_multiplier {
            config.sol_amount_multiplier = v;
        }
        if let Some(v) = self.max_sol {
            config.max_sol_per_trade = sol_to_lamports(v);
        }
        if let Some(v) = self.slippage_multiplier {
            config.slippage_multiplier = v;
        }
        if let Some(v) = self.priority_fee_multiplier {
            config.priority_fee_multiplier = v;
        }
        config
    }
}

/// Copy a watched wallet's buys until Ctrl-C
pub async fn copy(config: &Config, watched: &str, overrides: CopyOverrides) -> Result<()> {
    let watched = Pubkey::from_str(watched)
        .map_err(|e| anyhow::anyhow!("Invalid watched address: {}", e))?;

    let copy_config = overrides.apply(config.copy_trade.clone());
    copy_config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid copy-trade settings: {}", e))?;

    let services = services(config)?;
    if services.registry.is_empty() {
        warn!("No managed wallets; detected buys will not be replicated");
    }

    let engine = CopyTradeEngine::new(
        copy_config,
        services.chain.clone(),
        Arc::new(LogHeuristicClassifier::new(services.chain.clone())),
        Arc::new(PubsubLogSubscriber::new(&config.rpc.ws_endpoint)),
        services.orchestrator.clone(),
    );

    engine.start(watched).await?;
    println!(
        "Copy trading {} across {} wallets. Press Ctrl-C to stop.",
        watched,
        services.registry.len()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let status = engine.status().await;
    engine.stop().await;

    println!(
        "\nStopped. {} batches dispatched, {} notifications dropped.",
        status.batches_dispatched, status.dropped_notifications
    );
    Ok(())
}

/// Print the USD value of one holding
pub async fn value(config: &Config, mint: &str, owner: &str) -> Result<()> {
    let services = services(config)?;
    let price = Arc::new(HttpPriceQuote::new(&config.valuation)?);
    let cache = PortfolioValuationCache::new(services.amm.clone(), services.chain.clone(), price);

    let entry = cache.get(mint, owner).await?;

    println!("\n=== VALUATION ===");
    println!("Mint:       {}", mint);
    println!("Owner:      {}", owner);
    println!("Balance:    {} (raw)", entry.balance);
    println!("Market cap: ${:.2}", entry.market_cap_usd);
    println!("Value:      ${:.2}", entry.value_usd);
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_overrides_apply() {
        let overrides = CopyOverrides {
            sol_multiplier: Some(0.5),
            max_sol: Some(0.25),
            ..Default::default()
        };
        let config = overrides.apply(CopyTradeConfig::default());
        assert_eq!(config.sol_amount_multiplier, 0.5);
        assert_eq!(config.max_sol_per_trade, 250_000_000);
        assert_eq!(config.slippage_multiplier, 1.0);
    }

    #[test]
    fn test_select_wallets_defaults_to_all() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path()).unwrap();
        assert!(select_wallets(&registry, vec![]).is_err());

        let wallet = registry.generate(None).unwrap();
        assert_eq!(
            select_wallets(&registry, vec![]).unwrap(),
            vec![wallet.public_key.clone()]
        );
        assert_eq!(
            select_wallets(&registry, vec!["explicit".into()]).unwrap(),
            vec!["explicit".to_string()]
        );
    }
}
