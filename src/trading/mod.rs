//! Trading module - swap execution for managed wallets
//!
//! - `ChainClient` / `AmmClient`: collaborator seams with Solana RPC and
//!   PumpPortal implementations
//! - `TradeExecutor`: one swap for one wallet
//! - `BatchTradeOrchestrator`: sequential multi-wallet batches and sweeps

pub mod amm;
pub mod batch;
pub mod chain;
pub mod executor;
pub mod types;

pub use amm::{AmmClient, PumpPortalAmm};
pub use batch::{BatchTradeOrchestrator, NativeSweep, SweepPolicy, SweepReport};
pub use chain::{
    ChainClient, ObservedInstruction, ObservedTransaction, SolanaChain, SwapOutcome, TokenHolding,
};
pub use executor::TradeExecutor;
pub use types::{BatchTradeOutcome, PriorityFee, TradeErrorKind, TradeRequest, TradeResult};
