//! Chain access: balances, transaction lookup, account owners and transfers
//!
//! `ChainClient` is the seam the executor, orchestrator and copy-trade
//! classifier talk to. `SolanaChain` implements it over the nonblocking
//! RPC client and bounds every submission by an explicit confirmation deadline.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use solana_account_decoder::UiAccountData;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_instruction,
    transaction::{Transaction, VersionedTransaction},
};
use solana_transaction_status::{
    option_serializer::OptionSerializer, EncodedConfirmedTransactionWithStatusMeta,
    EncodedTransaction, UiInstruction, UiMessage, UiParsedInstruction, UiTransactionEncoding,
};
use tracing::{debug, info, warn};

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// A token account balance held by a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHolding {
    pub mint: String,
    /// Raw amount in base units
    pub amount: u64,
    pub decimals: u8,
}

/// Instruction view: program and the accounts it references
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedInstruction {
    pub program_id: String,
    pub accounts: Vec<String>,
}

/// RPC-independent view of a confirmed transaction
#[derive(Debug, Clone, Default)]
pub struct ObservedTransaction {
    pub signature: String,
    /// Account keys in message order; index 0 is the fee payer
    pub account_keys: Vec<String>,
    pub instructions: Vec<ObservedInstruction>,
    /// `None` when the node returned no log metadata
    pub log_messages: Option<Vec<String>>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub fee: u64,
    pub compute_units_consumed: Option<u64>,
    pub signature_count: usize,
}

impl ObservedTransaction {
    pub fn fee_payer(&self) -> Option<&str> {
        self.account_keys.first().map(String::as_str)
    }
}

/// Result of a submitted transaction that reached a verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Landed without error
    Confirmed(Signature),
    /// Refused by the venue or failed on-chain
    Rejected(String),
}

/// Chain operations used by trading and copy-trade classification
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native balance in lamports
    async fn balance(&self, owner: &Pubkey) -> Result<u64>;

    /// Every SPL token account owned by `owner`
    async fn token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>>;

    /// Raw balance of `mint` held by `owner`, summed across accounts
    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64>;

    /// Parsed transaction by signature; `None` if unavailable
    async fn transaction(&self, signature: &str) -> Result<Option<ObservedTransaction>>;

    /// Owning program of an account; `None` if the account does not exist
    async fn account_owner(&self, account: &Pubkey) -> Result<Option<Pubkey>>;

    /// Transfer lamports and wait for confirmation
    async fn transfer(&self, from: &Keypair, to: &Pubkey, lamports: u64) -> Result<Signature>;
}

/// `ChainClient` over the Solana JSON-RPC API
pub struct SolanaChain {
    rpc: Arc<RpcClient>,
    confirm_timeout: Duration,
    confirm_poll: Duration,
}

impl SolanaChain {
    pub fn new(config: &RpcConfig) -> Self {
        let rpc = RpcClient::new_with_timeout_and_commitment(
            config.endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
            CommitmentConfig::confirmed(),
        );

        Self {
            rpc: Arc::new(rpc),
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
            confirm_poll: Duration::from_millis(config.confirm_poll_ms),
        }
    }

    pub fn rpc(&self) -> &Arc<RpcClient> {
        &self.rpc
    }

    /// Send a signed transaction and wait until it is confirmed or the deadline passes
    pub async fn submit(&self, transaction: &VersionedTransaction) -> Result<SwapOutcome> {
        let signature = match self.rpc.send_transaction(transaction).await {
            Ok(signature) => signature,
            // Preflight simulation failures carry the program's verdict
            Err(e) if e.get_transaction_error().is_some() => {
                return Ok(SwapOutcome::Rejected(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Submitted transaction {}", signature);
        self.await_confirmation(signature).await
    }

    async fn await_confirmation(&self, signature: Signature) -> Result<SwapOutcome> {
        let deadline = Instant::now() + self.confirm_timeout;

        loop {
            let statuses = self.rpc.get_signature_statuses(&[signature]).await?.value;

            if let Some(Some(status)) = statuses.into_iter().next() {
                if let Some(err) = status.err {
                    return Ok(SwapOutcome::Rejected(format!("{} failed: {}", signature, err)));
                }
                if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                    return Ok(SwapOutcome::Confirmed(signature));
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    "Transaction {} unconfirmed after {}s",
                    signature,
                    self.confirm_timeout.as_secs()
                );
                return Err(Error::ConfirmationTimeout(self.confirm_timeout.as_secs()));
            }

            tokio::time::sleep(self.confirm_poll).await;
        }
    }

    async fn holdings_with_filter(
        &self,
        owner: &Pubkey,
        filter: TokenAccountsFilter,
    ) -> Result<Vec<TokenHolding>> {
        let accounts = self.rpc.get_token_accounts_by_owner(owner, filter).await?;

        Ok(accounts
            .into_iter()
            .filter_map(|keyed| match keyed.account.data {
                UiAccountData::Json(parsed) => parse_token_account(&parsed.parsed),
                _ => {
                    debug!("Token account {} not returned as parsed JSON", keyed.pubkey);
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl ChainClient for SolanaChain {
    async fn balance(&self, owner: &Pubkey) -> Result<u64> {
        Ok(self.rpc.get_balance(owner).await?)
    }

    async fn token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>> {
        self.holdings_with_filter(owner, TokenAccountsFilter::ProgramId(spl_token::ID))
            .await
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64> {
        let holdings = self
            .holdings_with_filter(owner, TokenAccountsFilter::Mint(*mint))
            .await?;
        Ok(holdings.iter().map(|h| h.amount).sum())
    }

    async fn transaction(&self, signature: &str) -> Result<Option<ObservedTransaction>> {
        let sig = Signature::from_str(signature)
            .map_err(|e| Error::Rpc(format!("Invalid signature {}: {}", signature, e)))?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        let encoded = match self.rpc.get_transaction_with_config(&sig, config).await {
            Ok(encoded) => encoded,
            Err(e) if is_null_result(&e) => {
                debug!("Transaction {} not available yet", signature);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(observe_transaction(signature, encoded))
    }

    async fn account_owner(&self, account: &Pubkey) -> Result<Option<Pubkey>> {
        let response = self
            .rpc
            .get_account_with_commitment(account, CommitmentConfig::confirmed())
            .await?;
        Ok(response.value.map(|a| a.owner))
    }

    async fn transfer(&self, from: &Keypair, to: &Pubkey, lamports: u64) -> Result<Signature> {
        let instruction = system_instruction::transfer(&from.pubkey(), to, lamports);

        let blockhash = self.rpc.get_latest_blockhash().await?;
        let transaction =
            Transaction::new_signed_with_payer(&[instruction], Some(&from.pubkey()), &[from], blockhash);

        match self.submit(&VersionedTransaction::from(transaction)).await? {
            SwapOutcome::Confirmed(signature) => {
                info!(
                    "Transfer complete: {} lamports to {} (sig: {})",
                    lamports, to, signature
                );
                Ok(signature)
            }
            SwapOutcome::Rejected(reason) => Err(Error::TradeRejected(reason)),
        }
    }
}

/// The node answered `null`, which the client reports as a decode error
fn is_null_result(error: &ClientError) -> bool {
    match error.kind() {
        ClientErrorKind::SerdeJson(e) => e.is_data() && e.to_string().contains("null"),
        _ => false,
    }
}

/// Flatten an RPC transaction into `ObservedTransaction`
///
/// Returns `None` when the node omitted status metadata.
pub fn observe_transaction(
    signature: &str,
    encoded: EncodedConfirmedTransactionWithStatusMeta,
) -> Option<ObservedTransaction> {
    let meta = encoded.transaction.meta?;

    let mut observed = ObservedTransaction {
        signature: signature.to_string(),
        log_messages: match meta.log_messages {
            OptionSerializer::Some(logs) => Some(logs),
            _ => None,
        },
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
        fee: meta.fee,
        compute_units_consumed: match meta.compute_units_consumed {
            OptionSerializer::Some(units) => Some(units),
            _ => None,
        },
        ..Default::default()
    };

    if let EncodedTransaction::Json(ui) = encoded.transaction.transaction {
        observed.signature_count = ui.signatures.len();

        match ui.message {
            UiMessage::Parsed(message) => {
                observed.account_keys = message
                    .account_keys
                    .iter()
                    .map(|k| k.pubkey.clone())
                    .collect();
                observed.instructions = message
                    .instructions
                    .into_iter()
                    .map(|ix| observe_instruction(ix, &observed.account_keys))
                    .collect();
            }
            UiMessage::Raw(message) => {
                observed.account_keys = message.account_keys;
                observed.instructions = message
                    .instructions
                    .into_iter()
                    .map(|ix| observe_instruction(UiInstruction::Compiled(ix), &observed.account_keys))
                    .collect();
            }
        }
    }

    Some(observed)
}

fn observe_instruction(instruction: UiInstruction, account_keys: &[String]) -> ObservedInstruction {
    let key_at = |idx: u8| account_keys.get(idx as usize).cloned().unwrap_or_default();

    match instruction {
        UiInstruction::Compiled(ix) => ObservedInstruction {
            program_id: key_at(ix.program_id_index),
            accounts: ix.accounts.into_iter().map(key_at).collect(),
        },
        UiInstruction::Parsed(UiParsedInstruction::PartiallyDecoded(ix)) => ObservedInstruction {
            program_id: ix.program_id,
            accounts: ix.accounts,
        },
        // Fully parsed instructions belong to known programs (system, token)
        UiInstruction::Parsed(UiParsedInstruction::Parsed(ix)) => ObservedInstruction {
            program_id: ix.program_id,
            accounts: Vec::new(),
        },
    }
}

/// Read mint, raw amount and decimals from a jsonParsed token account
pub fn parse_token_account(parsed: &Value) -> Option<TokenHolding> {
    let info = parsed.get("info")?;
    let mint = info.get("mint")?.as_str()?.to_string();
    let token_amount = info.get("tokenAmount")?;
    let amount = token_amount.get("amount")?.as_str()?.parse().ok()?;
    let decimals = token_amount.get("decimals")?.as_u64()? as u8;

    Some(TokenHolding {
        mint,
        amount,
        decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_token_account() {
        let parsed = json!({
            "type": "account",
            "info": {
                "isNative": false,
                "mint": "So11111111111111111111111111111111111111112",
                "owner": "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK",
                "state": "initialized",
                "tokenAmount": {
                    "amount": "1500000",
                    "decimals": 6,
                    "uiAmount": 1.5,
                    "uiAmountString": "1.5"
                }
            }
        });

        let holding = parse_token_account(&parsed).unwrap();
        assert_eq!(holding.mint, "So11111111111111111111111111111111111111112");
        assert_eq!(holding.amount, 1_500_000);
        assert_eq!(holding.decimals, 6);
    }

    #[test]
    fn test_null_transaction_result_is_not_an_error() {
        let null = serde_json::from_value::<EncodedConfirmedTransactionWithStatusMeta>(Value::Null)
            .unwrap_err();
        assert!(is_null_result(&ClientError::from(null)));

        let garbage = serde_json::from_value::<EncodedConfirmedTransactionWithStatusMeta>(
            json!({"slot": "not a number"}),
        )
        .unwrap_err();
        assert!(!is_null_result(&ClientError::from(garbage)));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        assert!(!is_null_result(&ClientError::from(io)));
    }

    #[test]
    fn test_parse_token_account_rejects_malformed() {
        assert!(parse_token_account(&json!({"info": {"mint": "x"}})).is_none());
        assert!(parse_token_account(&json!({})).is_none());
    }

    #[test]
    fn test_observe_compiled_instruction_resolves_indices() {
        let keys = vec!["payer".to_string(), "program".to_string(), "mint".to_string()];
        let ix = solana_transaction_status::UiCompiledInstruction {
            program_id_index: 1,
            accounts: vec![0, 2],
            data: String::new(),
            stack_height: None,
        };

        let observed = observe_instruction(UiInstruction::Compiled(ix), &keys);
        assert_eq!(observed.program_id, "program");
        assert_eq!(observed.accounts, vec!["payer".to_string(), "mint".to_string()]);
    }
}
