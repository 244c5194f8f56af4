//! In-memory collaborators for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
};
use tokio::sync::mpsc;

use crate::copytrade::subscription::SUBSCRIPTION_BUFFER;
use crate::copytrade::{LogNotification, LogSubscriber, LogSubscription};
use crate::error::{Error, Result};
use crate::pump::{BondingCurve, PUMP_PROGRAM_ID_STR};
use crate::trading::{
    AmmClient, ChainClient, ObservedInstruction, ObservedTransaction, PriorityFee, SwapOutcome,
    TokenHolding,
};
use crate::valuation::PriceQuote;

#[derive(Debug, Clone)]
pub struct RecordedTransfer {
    pub from: String,
    pub to: Pubkey,
    pub lamports: u64,
}

#[derive(Default)]
pub struct FakeChain {
    balances: Mutex<HashMap<String, u64>>,
    holdings: Mutex<HashMap<String, Vec<TokenHolding>>>,
    owners: Mutex<HashMap<String, Pubkey>>,
    transactions: Mutex<HashMap<String, ObservedTransaction>>,
    transfers: Mutex<Vec<RecordedTransfer>>,
    failing_holdings: Mutex<HashSet<String>>,
}

impl FakeChain {
    pub fn set_balance(&self, owner: &str, lamports: u64) {
        self.balances.lock().unwrap().insert(owner.to_string(), lamports);
    }

    pub fn add_holding(&self, owner: &str, mint: &str, amount: u64) {
        self.holdings
            .lock()
            .unwrap()
            .entry(owner.to_string())
            .or_default()
            .push(TokenHolding {
                mint: mint.to_string(),
                amount,
                decimals: 6,
            });
    }

    /// Holdings lookups for `owner` fail as if rate limited
    pub fn fail_holdings(&self, owner: &str) {
        self.failing_holdings.lock().unwrap().insert(owner.to_string());
    }

    pub fn set_owner(&self, account: &str, owner: Pubkey) {
        self.owners.lock().unwrap().insert(account.to_string(), owner);
    }

    pub fn add_transaction(&self, transaction: ObservedTransaction) {
        self.transactions
            .lock()
            .unwrap()
            .insert(transaction.signature.clone(), transaction);
    }

    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn balance(&self, owner: &Pubkey) -> Result<u64> {
        self.balances
            .lock()
            .unwrap()
            .get(&owner.to_string())
            .copied()
            .ok_or_else(|| Error::Rpc(format!("no balance for {}", owner)))
    }

    async fn token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>> {
        if self.failing_holdings.lock().unwrap().contains(&owner.to_string()) {
            return Err(Error::Rpc("429 Too Many Requests".to_string()));
        }
        Ok(self
            .holdings
            .lock()
            .unwrap()
            .get(&owner.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64> {
        let mint = mint.to_string();
        Ok(self
            .token_holdings(owner)
            .await?
            .iter()
            .filter(|h| h.mint == mint)
            .map(|h| h.amount)
            .sum())
    }

    async fn transaction(&self, signature: &str) -> Result<Option<ObservedTransaction>> {
        Ok(self.transactions.lock().unwrap().get(signature).cloned())
    }

    async fn account_owner(&self, account: &Pubkey) -> Result<Option<Pubkey>> {
        Ok(self.owners.lock().unwrap().get(&account.to_string()).copied())
    }

    async fn transfer(&self, from: &Keypair, to: &Pubkey, lamports: u64) -> Result<Signature> {
        let from_key = from.pubkey().to_string();
        {
            let mut balances = self.balances.lock().unwrap();
            let balance = balances.entry(from_key.clone()).or_default();
            if *balance < lamports {
                return Err(Error::TradeRejected("insufficient lamports".to_string()));
            }
            *balance -= lamports;
        }

        self.transfers.lock().unwrap().push(RecordedTransfer {
            from: from_key,
            to: *to,
            lamports,
        });
        Ok(Signature::new_unique())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedBuy {
    pub payer: String,
    pub mint: String,
    pub lamports: u64,
    pub slippage_bps: u32,
    pub priority_fee: Option<PriorityFee>,
}

#[derive(Debug, Clone)]
pub struct RecordedSell {
    pub payer: String,
    pub mint: String,
    pub ui_amount: f64,
    pub slippage_bps: u32,
}

/// Records every call; confirms unless told to reject or fail
#[derive(Default)]
pub struct FakeAmm {
    buys: Mutex<Vec<RecordedBuy>>,
    sells: Mutex<Vec<RecordedSell>>,
    rejected_payers: Mutex<HashSet<String>>,
    failing_payers: Mutex<HashSet<String>>,
    rejected_mints: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    curve: Mutex<Option<(BondingCurve, u64)>>,
}

impl FakeAmm {
    pub fn buys(&self) -> Vec<RecordedBuy> {
        self.buys.lock().unwrap().clone()
    }

    pub fn buy_count(&self) -> usize {
        self.buys.lock().unwrap().len()
    }

    pub fn sells(&self) -> Vec<RecordedSell> {
        self.sells.lock().unwrap().clone()
    }

    pub fn reject_payer(&self, payer: &str) {
        self.rejected_payers.lock().unwrap().insert(payer.to_string());
    }

    pub fn fail_payer(&self, payer: &str) {
        self.failing_payers.lock().unwrap().insert(payer.to_string());
    }

    pub fn reject_mint(&self, mint: &str) {
        self.rejected_mints.lock().unwrap().insert(mint.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_curve(&self, curve: BondingCurve, total_supply: u64) {
        *self.curve.lock().unwrap() = Some((curve, total_supply));
    }

    async fn verdict(&self, payer: &str, mint: &str) -> Result<SwapOutcome> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_payers.lock().unwrap().contains(payer) {
            return Err(Error::ConfirmationTimeout(45));
        }
        if self.rejected_payers.lock().unwrap().contains(payer)
            || self.rejected_mints.lock().unwrap().contains(mint)
        {
            return Ok(SwapOutcome::Rejected("slippage exceeded".to_string()));
        }
        Ok(SwapOutcome::Confirmed(Signature::new_unique()))
    }
}

#[async_trait]
impl AmmClient for FakeAmm {
    async fn buy(
        &self,
        payer: &Keypair,
        mint: &Pubkey,
        lamports: u64,
        slippage_bps: u32,
        priority_fee: Option<PriorityFee>,
    ) -> Result<SwapOutcome> {
        let payer = payer.pubkey().to_string();
        let mint = mint.to_string();
        self.buys.lock().unwrap().push(RecordedBuy {
            payer: payer.clone(),
            mint: mint.clone(),
            lamports,
            slippage_bps,
            priority_fee,
        });
        self.verdict(&payer, &mint).await
    }

    async fn sell(
        &self,
        payer: &Keypair,
        mint: &Pubkey,
        ui_amount: f64,
        slippage_bps: u32,
    ) -> Result<SwapOutcome> {
        let payer = payer.pubkey().to_string();
        let mint = mint.to_string();
        self.sells.lock().unwrap().push(RecordedSell {
            payer: payer.clone(),
            mint: mint.clone(),
            ui_amount,
            slippage_bps,
        });
        self.verdict(&payer, &mint).await
    }

    async fn bonding_curve(&self, _mint: &Pubkey) -> Result<BondingCurve> {
        self.curve
            .lock()
            .unwrap()
            .as_ref()
            .map(|(curve, _)| curve.clone())
            .ok_or_else(|| Error::Rpc("no bonding curve".to_string()))
    }

    async fn total_supply(&self, _mint: &Pubkey) -> Result<u64> {
        self.curve
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, supply)| *supply)
            .ok_or_else(|| Error::Rpc("no supply".to_string()))
    }
}

/// Hands out subscriptions fed by `push`
#[derive(Default)]
pub struct FakeSubscriber {
    senders: Mutex<Vec<mpsc::Sender<LogNotification>>>,
}

impl FakeSubscriber {
    pub fn push(&self, notification: LogNotification) {
        for sender in self.senders.lock().unwrap().iter() {
            let _ = sender.try_send(notification.clone());
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }
}

#[async_trait]
impl LogSubscriber for FakeSubscriber {
    async fn subscribe(&self, _account: &Pubkey) -> Result<LogSubscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.senders.lock().unwrap().push(tx);
        Ok(LogSubscription::new(rx, None))
    }
}

pub struct FixedPrice(pub f64);

#[async_trait]
impl PriceQuote for FixedPrice {
    async fn sol_usd(&self) -> Result<f64> {
        Ok(self.0)
    }
}

/// A confirmed pump.fun buy spending `sol_spent` lamports plus fees
///
/// Fee is 5_000 base plus 45_000 priority over 90_000 compute units.
pub fn pump_buy_transaction(signature: &str, sol_spent: u64, mint: &str) -> ObservedTransaction {
    let payer = Pubkey::new_unique().to_string();
    let global = Pubkey::new_unique().to_string();
    let fee_recipient = Pubkey::new_unique().to_string();
    let bonding_curve = Pubkey::new_unique().to_string();
    let curve_ata = Pubkey::new_unique().to_string();
    let user_ata = Pubkey::new_unique().to_string();
    let fee = 50_000;
    let pre = 10_000_000_000u64;

    ObservedTransaction {
        signature: signature.to_string(),
        account_keys: vec![
            payer.clone(),
            user_ata.clone(),
            bonding_curve.clone(),
            curve_ata.clone(),
            fee_recipient.clone(),
            global.clone(),
            mint.to_string(),
            PUMP_PROGRAM_ID_STR.to_string(),
        ],
        instructions: vec![ObservedInstruction {
            program_id: PUMP_PROGRAM_ID_STR.to_string(),
            accounts: vec![
                global,
                fee_recipient,
                mint.to_string(),
                bonding_curve,
                curve_ata,
                user_ata,
                payer,
            ],
        }],
        log_messages: Some(vec![
            format!("Program {} invoke [1]", PUMP_PROGRAM_ID_STR),
            "Program log: Instruction: Buy".to_string(),
            format!("Program {} success", PUMP_PROGRAM_ID_STR),
        ]),
        pre_balances: vec![pre, 0, 0],
        post_balances: vec![pre - sol_spent - fee, 2_039_280, 0],
        fee,
        compute_units_consumed: Some(90_000),
        signature_count: 1,
    }
}

/// Poll `condition` for up to two seconds
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
