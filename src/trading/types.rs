//! Trade request/result types shared by the executor and orchestrator

use serde::Serialize;

use crate::error::Error;

/// Compute-budget priority fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriorityFee {
    /// Micro-lamports per compute unit
    pub unit_price: u64,
    /// Compute unit limit
    pub unit_limit: u32,
}

impl PriorityFee {
    /// Total priority fee in lamports
    pub fn total_lamports(&self) -> u64 {
        ((self.unit_price as u128 * self.unit_limit as u128) / 1_000_000) as u64
    }
}

/// One directional buy for one wallet
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub wallet_id: String,
    pub mint: String,
    /// Lamports to spend, must be positive
    pub sol_amount: u64,
    pub slippage_bps: u32,
    pub priority_fee: Option<PriorityFee>,
}

/// Why a single trade failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TradeErrorKind {
    WalletNotFound,
    InsufficientBalance { available: u64, required: u64 },
    TradeRejected(String),
    TransientFailure(String),
    InvalidRequest(String),
}

impl std::fmt::Display for TradeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeErrorKind::WalletNotFound => write!(f, "wallet not found"),
            TradeErrorKind::InsufficientBalance {
                available,
                required,
            } => write!(
                f,
                "insufficient balance: {} lamports available, {} required",
                available, required
            ),
            TradeErrorKind::TradeRejected(msg) => write!(f, "rejected: {}", msg),
            TradeErrorKind::TransientFailure(msg) => write!(f, "transient failure: {}", msg),
            TradeErrorKind::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
        }
    }
}

impl From<Error> for TradeErrorKind {
    fn from(e: Error) -> Self {
        match e {
            Error::WalletNotFound(_) => TradeErrorKind::WalletNotFound,
            Error::InsufficientBalance {
                available,
                required,
            } => TradeErrorKind::InsufficientBalance {
                available,
                required,
            },
            Error::TradeRejected(msg) => TradeErrorKind::TradeRejected(msg),
            other => TradeErrorKind::TransientFailure(other.to_string()),
        }
    }
}

/// Outcome of one wallet's trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeResult {
    pub wallet_id: String,
    pub success: bool,
    pub signature: Option<String>,
    pub error: Option<TradeErrorKind>,
}

impl TradeResult {
    pub fn ok(wallet_id: &str, signature: String) -> Self {
        Self {
            wallet_id: wallet_id.to_string(),
            success: true,
            signature: Some(signature),
            error: None,
        }
    }

    pub fn failed(wallet_id: &str, error: TradeErrorKind) -> Self {
        Self {
            wallet_id: wallet_id.to_string(),
            success: false,
            signature: None,
            error: Some(error),
        }
    }
}

/// Aggregated result of a multi-wallet trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchTradeOutcome {
    /// True iff every wallet succeeded
    pub overall_success: bool,
    /// One result per requested wallet, in request order
    pub per_wallet: Vec<TradeResult>,
}

impl BatchTradeOutcome {
    pub fn from_results(per_wallet: Vec<TradeResult>) -> Self {
        Self {
            overall_success: per_wallet.iter().all(|r| r.success),
            per_wallet,
        }
    }

    pub fn success_count(&self) -> usize {
        self.per_wallet.iter().filter(|r| r.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.per_wallet.len() - self.success_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_fee_total() {
        let fee = PriorityFee {
            unit_price: 100_000,
            unit_limit: 200_000,
        };
        assert_eq!(fee.total_lamports(), 20_000);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            TradeErrorKind::from(Error::WalletNotFound("x".into())),
            TradeErrorKind::WalletNotFound
        );
        assert_eq!(
            TradeErrorKind::from(Error::Rpc("503".into())),
            TradeErrorKind::TransientFailure("RPC error: 503".into())
        );
    }

    #[test]
    fn test_outcome_is_and_of_results() {
        let outcome = BatchTradeOutcome::from_results(vec![
            TradeResult::ok("a", "sig".into()),
            TradeResult::failed("b", TradeErrorKind::WalletNotFound),
        ]);
        assert!(!outcome.overall_success);
        assert_eq!(outcome.success_count(), 1);
        assert_eq!(outcome.failure_count(), 1);

        assert!(BatchTradeOutcome::from_results(vec![]).overall_success);
    }
}
