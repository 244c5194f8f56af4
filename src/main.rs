//! pumpcopy - multi-wallet pump.fun trader with copy trading
//!
//! # WARNING
//! - This tool trades with real money. Only use funds you can afford to lose.
//! - Wallet records hold unencrypted private keys. Protect the storage directory.
//! - Copied trades land after the source trade, at a worse price.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use pumpcopy::cli::commands::{self, CopyOverrides};
use pumpcopy::config::Config;

/// Multi-wallet pump.fun trader
#[derive(Parser)]
#[command(name = "pumpcopy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet management commands
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Buy a token from managed wallets
    Buy {
        /// Token mint address
        mint: String,

        /// SOL to spend per wallet
        sol: f64,

        /// Wallet addresses to buy from (default: all)
        #[arg(short, long)]
        wallet: Vec<String>,

        /// Slippage in basis points (default: from config)
        #[arg(long)]
        slippage_bps: Option<u32>,
    },

    /// Sell each wallet's full balance of a token
    Sell {
        /// Token mint address
        mint: String,

        /// Wallet addresses to sell from (default: all)
        #[arg(short, long)]
        wallet: Vec<String>,

        /// Slippage in basis points (default: from config)
        #[arg(long)]
        slippage_bps: Option<u32>,
    },

    /// Mirror a watched wallet's buys across all managed wallets
    Copy {
        /// Address to watch
        watched: String,

        /// Multiplier on the observed SOL amount
        #[arg(long)]
        sol_multiplier: Option<f64>,

        /// Per-trade cap in SOL
        #[arg(long)]
        max_sol: Option<f64>,

        /// Multiplier on the base slippage
        #[arg(long)]
        slippage_multiplier: Option<f64>,

        /// Multiplier on the observed priority fee
        #[arg(long)]
        priority_fee_multiplier: Option<f64>,
    },

    /// Show the USD value of a holding
    Value {
        /// Token mint address
        mint: String,

        /// Holder address
        owner: String,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[derive(Subcommand)]
enum WalletAction {
    /// Generate a new managed wallet
    Create {
        /// Human-readable label
        #[arg(long)]
        label: Option<String>,
    },

    /// List managed wallets
    List,

    /// Delete one wallet record
    Delete {
        /// Wallet address
        id: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Delete every wallet record
    DeleteAll {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Sell all tokens and send remaining SOL to the treasury
    Sweep {
        /// Wallet address
        id: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pumpcopy=info".parse()?),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    startup_checks(&config);

    let result = match cli.command {
        Commands::Wallet { action } => match action {
            WalletAction::Create { label } => commands::wallet_create(&config, label),
            WalletAction::List => commands::wallet_list(&config),
            WalletAction::Delete { id, force } => commands::wallet_delete(&config, &id, force),
            WalletAction::DeleteAll { force } => commands::wallet_delete_all(&config, force),
            WalletAction::Sweep { id, force } => {
                commands::wallet_sweep(&config, &id, force).await
            }
        },
        Commands::Buy {
            mint,
            sol,
            wallet,
            slippage_bps,
        } => commands::buy(&config, &mint, sol, wallet, slippage_bps).await,
        Commands::Sell {
            mint,
            wallet,
            slippage_bps,
        } => commands::sell(&config, &mint, wallet, slippage_bps).await,
        Commands::Copy {
            watched,
            sol_multiplier,
            max_sol,
            slippage_multiplier,
            priority_fee_multiplier,
        } => {
            let overrides = CopyOverrides {
                sol_multiplier,
                max_sol,
                slippage_multiplier,
                priority_fee_multiplier,
            };
            commands::copy(&config, &watched, overrides).await
        }
        Commands::Value { mint, owner } => commands::value(&config, &mint, &owner).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Warn about an unprotected wallet directory
fn startup_checks(config: &Config) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(metadata) = std::fs::metadata(&config.wallet.storage_dir) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "Wallet directory {} has permissions {:o}. Run 'chmod 700 {}' to fix.",
                    config.wallet.storage_dir,
                    mode & 0o777,
                    config.wallet.storage_dir
                );
            }
        }
    }

    if config.wallet.treasury.is_none() {
        info!("No treasury configured; sweeps are disabled");
    }
}
