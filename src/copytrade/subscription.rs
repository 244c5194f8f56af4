//! Log-stream subscription for the watched account
//!
//! `PubsubLogSubscriber` runs `logsSubscribe` with a mentions filter in a
//! background task and reconnects after disconnects. Notifications are
//! handed over through a bounded channel; when the consumer stops draining
//! it, the task stops reading the websocket.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Notifications buffered between the websocket task and the consumer
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// One log notification for a transaction mentioning the watched account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogNotification {
    pub signature: String,
    /// Transaction failed on-chain
    pub failed: bool,
    pub logs: Vec<String>,
}

/// Live subscription; dropping it tears down the background task
pub struct LogSubscription {
    pub notifications: mpsc::Receiver<LogNotification>,
    task: Option<JoinHandle<()>>,
}

impl LogSubscription {
    pub fn new(
        notifications: mpsc::Receiver<LogNotification>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            notifications,
            task,
        }
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Source of log notifications for an account
#[async_trait]
pub trait LogSubscriber: Send + Sync {
    async fn subscribe(&self, account: &Pubkey) -> Result<LogSubscription>;
}

/// `LogSubscriber` over the websocket pubsub API
pub struct PubsubLogSubscriber {
    ws_url: String,
    reconnect_delay: Duration,
}

impl PubsubLogSubscriber {
    pub fn new(ws_url: &str) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            reconnect_delay: Duration::from_secs(1),
        }
    }

    /// Stream notifications until the connection drops or the receiver goes away
    async fn stream_once(
        ws_url: &str,
        account: &Pubkey,
        tx: &mpsc::Sender<LogNotification>,
        connected: &mut Option<oneshot::Sender<Result<()>>>,
    ) -> Result<()> {
        let client = PubsubClient::new(ws_url).await?;

        let (mut stream, unsubscribe) = client
            .logs_subscribe(
                RpcTransactionLogsFilter::Mentions(vec![account.to_string()]),
                RpcTransactionLogsConfig {
                    commitment: Some(CommitmentConfig::confirmed()),
                },
            )
            .await?;

        info!("Subscribed to logs mentioning {}", account);
        if let Some(connected) = connected.take() {
            let _ = connected.send(Ok(()));
        }

        while let Some(response) = stream.next().await {
            let notification = LogNotification {
                signature: response.value.signature,
                failed: response.value.err.is_some(),
                logs: response.value.logs,
            };

            if tx.send(notification).await.is_err() {
                break;
            }
        }

        unsubscribe().await;
        Ok(())
    }
}

#[async_trait]
impl LogSubscriber for PubsubLogSubscriber {
    async fn subscribe(&self, account: &Pubkey) -> Result<LogSubscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (connected_tx, connected_rx) = oneshot::channel();

        let ws_url = self.ws_url.clone();
        let account = *account;
        let delay = self.reconnect_delay;

        let task = tokio::spawn(async move {
            let mut connected = Some(connected_tx);

            loop {
                match Self::stream_once(&ws_url, &account, &tx, &mut connected).await {
                    Ok(()) => warn!("Log subscription for {} ended", account),
                    Err(e) => {
                        // Surface the first connection failure to the caller
                        if let Some(connected) = connected.take() {
                            let _ = connected.send(Err(e));
                            return;
                        }
                        error!("Log subscription error: {}", e);
                    }
                }

                if tx.is_closed() {
                    return;
                }

                warn!("Reconnecting in {:?}...", delay);
                sleep(delay).await;
            }
        });

        match connected_rx.await {
            Ok(Ok(())) => Ok(LogSubscription::new(rx, Some(task))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Rpc("Log subscription task exited".to_string())),
        }
    }
}
