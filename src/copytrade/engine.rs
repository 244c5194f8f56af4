//! Copy-trade engine
//!
//! ```text
//! LogSubscriber → forwarder → BackpressureChannel → consumer → pipeline × N
//!                                                                  ↓
//!                                                   BatchTradeOrchestrator
//! ```
//!
//! Each notification runs its own pipeline (fetch, classify, size,
//! dispatch), bounded by `max_in_flight`. Pipelines share only an immutable
//! config snapshot; every error ends in a log line.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::classifier::{Direction, TradeClassifier};
use super::config::CopyTradeConfig;
use super::sizing::size_replica;
use super::subscription::{LogNotification, LogSubscriber, LogSubscription};
use crate::error::{Error, Result};
use crate::pump::lamports_to_sol;
use crate::stream::BackpressureChannel;
use crate::trading::{BatchTradeOrchestrator, BatchTradeOutcome, ChainClient};

/// Signatures remembered for duplicate suppression
const SEEN_CAPACITY: usize = 10_000;
const SEEN_TTL: Duration = Duration::from_secs(600);

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disabled,
    Armed,
}

#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub state: EngineState,
    pub watched: Option<Pubkey>,
    /// Notifications discarded by the backpressure policy
    pub dropped_notifications: u64,
    /// Replica batches dispatched since construction
    pub batches_dispatched: u64,
}

enum Run {
    Disabled,
    Armed {
        watched: Pubkey,
        channel: Arc<BackpressureChannel<LogNotification>>,
        forwarder: JoinHandle<()>,
        consumer: JoinHandle<()>,
    },
}

/// State shared with pipeline tasks
struct Shared {
    enabled: AtomicBool,
    config: RwLock<Arc<CopyTradeConfig>>,
    chain: Arc<dyn ChainClient>,
    classifier: Arc<dyn TradeClassifier>,
    orchestrator: Arc<BatchTradeOrchestrator>,
    seen: DashMap<String, Instant>,
    batches_dispatched: AtomicU64,
}

/// Mirrors a watched wallet's pump.fun buys across every managed wallet
pub struct CopyTradeEngine {
    shared: Arc<Shared>,
    subscriber: Arc<dyn LogSubscriber>,
    run: Mutex<Run>,
}

impl CopyTradeEngine {
    pub fn new(
        config: CopyTradeConfig,
        chain: Arc<dyn ChainClient>,
        classifier: Arc<dyn TradeClassifier>,
        subscriber: Arc<dyn LogSubscriber>,
        orchestrator: Arc<BatchTradeOrchestrator>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                enabled: AtomicBool::new(false),
                config: RwLock::new(Arc::new(config)),
                chain,
                classifier,
                orchestrator,
                seen: DashMap::new(),
                batches_dispatched: AtomicU64::new(0),
            }),
            subscriber,
            run: Mutex::new(Run::Disabled),
        }
    }

    /// Subscribe to `watched` and start replicating its buys
    ///
    /// A second call while armed only logs a warning.
    pub async fn start(&self, watched: Pubkey) -> Result<()> {
        let mut run = self.run.lock().await;

        if let Run::Armed { watched: current, .. } = &*run {
            warn!("Copy trading already armed for {}, ignoring start", current);
            return Ok(());
        }

        let config = self.shared.snapshot();
        let subscription = self.subscriber.subscribe(&watched).await?;

        let channel = Arc::new(BackpressureChannel::new(
            config.channel_capacity,
            config.drop_policy,
        ));

        self.shared.enabled.store(true, Ordering::SeqCst);

        let forwarder = tokio::spawn(forward(subscription, channel.clone()));
        let consumer = tokio::spawn(consume(
            self.shared.clone(),
            channel.clone(),
            config.max_in_flight,
        ));

        info!(
            "Copy trading armed for {} (x{} size, cap {} SOL)",
            watched,
            config.sol_amount_multiplier,
            lamports_to_sol(config.max_sol_per_trade)
        );

        *run = Run::Armed {
            watched,
            channel,
            forwarder,
            consumer,
        };
        Ok(())
    }

    /// Disarm; pipelines already running stop at their next gate check
    pub async fn stop(&self) {
        self.shared.enabled.store(false, Ordering::SeqCst);

        let mut run = self.run.lock().await;
        match mem::replace(&mut *run, Run::Disabled) {
            Run::Armed {
                watched,
                channel,
                forwarder,
                consumer,
            } => {
                channel.close();
                forwarder.abort();
                consumer.abort();
                info!(
                    "Copy trading stopped for {} ({} notifications dropped)",
                    watched,
                    channel.dropped_count()
                );
            }
            Run::Disabled => debug!("Copy trading already stopped"),
        }
    }

    /// Replace the config used by pipelines started from now on
    ///
    /// Channel capacity, drop policy and `max_in_flight` apply at the next `start`.
    pub fn update_config(&self, config: CopyTradeConfig) -> Result<()> {
        config.validate().map_err(Error::Config)?;

        let mut current = self.shared.config.write().unwrap_or_else(|e| e.into_inner());
        *current = Arc::new(config);
        info!("Copy-trade config updated");
        Ok(())
    }

    pub fn config(&self) -> Arc<CopyTradeConfig> {
        self.shared.snapshot()
    }

    pub async fn status(&self) -> EngineStatus {
        let run = self.run.lock().await;
        let batches_dispatched = self.shared.batches_dispatched.load(Ordering::Relaxed);

        match &*run {
            Run::Disabled => EngineStatus {
                state: EngineState::Disabled,
                watched: None,
                dropped_notifications: 0,
                batches_dispatched,
            },
            Run::Armed {
                watched, channel, ..
            } => EngineStatus {
                state: EngineState::Armed,
                watched: Some(*watched),
                dropped_notifications: channel.dropped_count(),
                batches_dispatched,
            },
        }
    }
}

async fn forward(
    mut subscription: LogSubscription,
    channel: Arc<BackpressureChannel<LogNotification>>,
) {
    while let Some(notification) = subscription.notifications.recv().await {
        if channel.send(notification).await.is_err() {
            break;
        }
    }
    channel.close();
}

async fn consume(
    shared: Arc<Shared>,
    channel: Arc<BackpressureChannel<LogNotification>>,
    max_in_flight: usize,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));

    while let Some(notification) = channel.recv().await {
        if !shared.is_enabled() {
            continue;
        }

        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let shared = shared.clone();
        tokio::spawn(async move {
            shared.handle(notification).await;
            drop(permit);
        });
    }
}

impl Shared {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Arc<CopyTradeConfig> {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Record a signature; false if it was already seen
    fn remember(&self, signature: &str) -> bool {
        if self.seen.len() >= SEEN_CAPACITY {
            self.seen.retain(|_, seen_at| seen_at.elapsed() < SEEN_TTL);
            if self.seen.len() >= SEEN_CAPACITY {
                self.seen.clear();
            }
        }

        self.seen
            .insert(signature.to_string(), Instant::now())
            .is_none()
    }

    async fn handle(&self, notification: LogNotification) {
        if !self.is_enabled() {
            return;
        }

        let signature = notification.signature.clone();
        match self.process(notification).await {
            Ok(Some(outcome)) => info!(
                "Replicated {}: {}/{} wallets filled",
                signature,
                outcome.success_count(),
                outcome.per_wallet.len()
            ),
            Ok(None) => {}
            Err(Error::ClassificationAborted(reason)) => {
                info!("Skipped {}: {}", signature, reason)
            }
            Err(e) => error!("Copy-trade pipeline failed for {}: {}", signature, e),
        }
    }

    async fn process(&self, notification: LogNotification) -> Result<Option<BatchTradeOutcome>> {
        if notification.failed {
            debug!("Ignoring failed source transaction {}", notification.signature);
            return Ok(None);
        }

        if !self.remember(&notification.signature) {
            debug!("Duplicate notification {}", notification.signature);
            return Ok(None);
        }

        let Some(transaction) = self.chain.transaction(&notification.signature).await? else {
            debug!("No transaction metadata for {}", notification.signature);
            return Ok(None);
        };

        let Some(trade) = self.classifier.classify(&transaction).await? else {
            debug!("{} does not touch pump.fun", notification.signature);
            return Ok(None);
        };

        if trade.direction != Direction::Buy {
            debug!("{} is not a buy", notification.signature);
            return Ok(None);
        }

        let mint = trade.mint.ok_or_else(|| {
            Error::ClassificationAborted(format!(
                "could not resolve mint for {}",
                notification.signature
            ))
        })?;

        let config = self.snapshot();
        if !config.enabled {
            debug!("Copy trading paused by config");
            return Ok(None);
        }

        let Some(order) = size_replica(mint, trade.source_sol_spent, &transaction, &config) else {
            debug!("Replica for {} sizes to zero", notification.signature);
            return Ok(None);
        };

        let wallet_ids = self.orchestrator.executor().registry().ids();
        if wallet_ids.is_empty() {
            warn!("No managed wallets to replicate {} into", notification.signature);
            return Ok(None);
        }

        // stop() may have landed while this pipeline was fetching
        if !self.is_enabled() {
            return Ok(None);
        }

        info!(
            "Source bought {} for {} SOL, replicating {} SOL x {} wallets",
            order.mint,
            lamports_to_sol(trade.source_sol_spent),
            lamports_to_sol(order.sol_amount),
            wallet_ids.len()
        );

        // Rechecked under the submission lock; a queued batch can outlive stop()
        let Some(outcome) = self
            .orchestrator
            .execute_if_enabled(
                &self.enabled,
                &wallet_ids,
                &order.mint,
                order.sol_amount,
                order.slippage_bps,
                order.priority_fee,
            )
            .await
        else {
            debug!(
                "Copy trading stopped before {} was dispatched",
                notification.signature
            );
            return Ok(None);
        };

        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(Some(outcome))
    }
}
