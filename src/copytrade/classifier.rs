//! Source-trade classification
//!
//! `LogHeuristicClassifier` reads program logs and balance deltas instead of
//! decoding instructions. Its known limits:
//! - direction comes from a text match on the log lines
//! - spend is the fee payer's lamport delta, so it includes network fees
//! - the mint is the first token-program-owned account it finds, which can
//!   be a token account rather than the mint when ordering is unusual

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::debug;

use crate::error::Result;
use crate::pump::PUMP_PROGRAM_ID_STR;
use crate::trading::{ChainClient, ObservedTransaction};

/// Direction of an observed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Unknown,
}

/// What the classifier could extract from a source transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedSourceTrade {
    /// Fee payer lamport delta, fees included
    pub source_sol_spent: u64,
    /// `None` when mint resolution failed
    pub mint: Option<String>,
    pub direction: Direction,
}

/// Turns a fetched transaction into a source trade
///
/// `Ok(None)` means the transaction does not involve the AMM.
#[async_trait]
pub trait TradeClassifier: Send + Sync {
    async fn classify(
        &self,
        transaction: &ObservedTransaction,
    ) -> Result<Option<DetectedSourceTrade>>;
}

lazy_static::lazy_static! {
    static ref BUY_LOG: Regex =
        Regex::new(r"(?i)instruction:\s*buy\b").expect("Invalid buy log pattern");
}

/// Log text and balance heuristics
pub struct LogHeuristicClassifier {
    chain: Arc<dyn ChainClient>,
    program_id: String,
}

impl LogHeuristicClassifier {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self {
            chain,
            program_id: PUMP_PROGRAM_ID_STR.to_string(),
        }
    }

    /// Logs mention the AMM program
    pub fn is_relevant(&self, logs: &[String]) -> bool {
        logs.iter().any(|line| line.contains(&self.program_id))
    }

    pub fn direction(logs: &[String]) -> Direction {
        if logs.iter().any(|line| BUY_LOG.is_match(line)) {
            Direction::Buy
        } else {
            Direction::Unknown
        }
    }

    /// Fee payer's pre minus post balance, zero if it gained
    pub fn fee_payer_spend(transaction: &ObservedTransaction) -> u64 {
        match (
            transaction.pre_balances.first(),
            transaction.post_balances.first(),
        ) {
            (Some(pre), Some(post)) => pre.saturating_sub(*post),
            _ => 0,
        }
    }

    /// Candidate accounts in scan order: AMM instruction accounts first,
    /// then the remaining message keys
    fn mint_candidates<'a>(&self, transaction: &'a ObservedTransaction) -> Vec<&'a str> {
        let mut candidates: Vec<&str> = Vec::new();

        let amm_accounts = transaction
            .instructions
            .iter()
            .filter(|ix| ix.program_id == self.program_id)
            .flat_map(|ix| ix.accounts.iter());

        for key in amm_accounts.chain(transaction.account_keys.iter()) {
            if key != &self.program_id && !candidates.contains(&key.as_str()) {
                candidates.push(key);
            }
        }

        candidates
    }

    async fn resolve_mint(&self, transaction: &ObservedTransaction) -> Option<String> {
        for candidate in self.mint_candidates(transaction) {
            let Ok(key) = Pubkey::from_str(candidate) else {
                continue;
            };

            match self.chain.account_owner(&key).await {
                Ok(Some(owner)) if owner == spl_token::ID => return Some(candidate.to_string()),
                Ok(_) => {}
                Err(e) => debug!("Owner lookup failed for {}: {}", candidate, e),
            }
        }

        let fallback = positional_mint(&transaction.account_keys, &self.program_id);
        if let Some(mint) = &fallback {
            debug!(
                "No token-program account in {}, guessing {} by position",
                transaction.signature, mint
            );
        }
        fallback
    }
}

/// The account key right after the program id
pub fn positional_mint(account_keys: &[String], program_id: &str) -> Option<String> {
    let idx = account_keys.iter().position(|key| key == program_id)?;
    account_keys.get(idx + 1).cloned()
}

#[async_trait]
impl TradeClassifier for LogHeuristicClassifier {
    async fn classify(
        &self,
        transaction: &ObservedTransaction,
    ) -> Result<Option<DetectedSourceTrade>> {
        let Some(logs) = transaction.log_messages.as_deref() else {
            return Ok(None);
        };

        if !self.is_relevant(logs) {
            return Ok(None);
        }

        let direction = Self::direction(logs);
        let source_sol_spent = Self::fee_payer_spend(transaction);

        // Only buys are replicated, skip the owner lookups otherwise
        let mint = match direction {
            Direction::Buy => self.resolve_mint(transaction).await,
            Direction::Unknown => None,
        };

        Ok(Some(DetectedSourceTrade {
            source_sol_spent,
            mint,
            direction,
        }))
    }
}
