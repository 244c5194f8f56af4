//! Pump.fun multi-wallet trader
//!
//! Manages a pool of trading wallets, fans buys and sells out across them,
//! mirrors a watched wallet's buys, and values holdings off the bonding curve.

pub mod cli;
pub mod config;
pub mod copytrade;
pub mod error;
pub mod pump;
pub mod stream;
pub mod trading;
pub mod valuation;
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
