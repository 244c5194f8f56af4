//! Error types for the trader

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trader
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    // Wallet registry errors
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Wallet already registered: {0}")]
    WalletExists(String),

    #[error("Wallet storage error: {0}")]
    Storage(String),

    // Trading errors
    #[error("Insufficient balance: {available} lamports available, {required} lamports required")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("Trade rejected: {0}")]
    TradeRejected(String),

    #[error("Transient failure: {0}")]
    TransientFailure(String),

    #[error("Transaction not confirmed after {0}s")]
    ConfirmationTimeout(u64),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // Pump.fun protocol errors
    #[error("Bonding curve decode failed: {0}")]
    BondingCurveDecode(String),

    // Valuation errors
    #[error("Valuation error: {0}")]
    Valuation(String),

    // Copy-trade pipeline, never surfaced past the engine
    #[error("Classification aborted: {0}")]
    ClassificationAborted(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::Http(_) | Error::TransientFailure(_) | Error::ConfirmationTimeout(_)
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

impl From<solana_client::nonblocking::pubsub_client::PubsubClientError> for Error {
    fn from(e: solana_client::nonblocking::pubsub_client::PubsubClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Rpc("timeout".into()).is_retryable());
        assert!(Error::ConfirmationTimeout(30).is_retryable());
        assert!(!Error::TradeRejected("slippage".into()).is_retryable());
        assert!(!Error::Valuation("zero supply".into()).is_retryable());
    }
}
