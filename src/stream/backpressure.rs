//! Backpressure handling between the log subscription and its consumer
//!
//! A busy watched wallet can emit notifications faster than pipelines
//! finish their RPC round-trips. The channel is bounded and the drop
//! policy decides what gives when it fills up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Deserialize;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Drop policy for when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Evict the oldest queued item to admit the new one
    #[default]
    DropOldest,
    /// Discard the incoming item
    DropNewest,
    /// Wait for the consumer to make room
    Block,
}

/// Bounded multi-producer, single-consumer queue with a drop policy
pub struct BackpressureChannel<T> {
    capacity: usize,
    drop_policy: DropPolicy,
    buffer: Mutex<VecDeque<T>>,
    item_ready: Notify,
    space_ready: Notify,
    closed: AtomicBool,
    dropped_count: AtomicU64,
}

impl<T: Send> BackpressureChannel<T> {
    /// Create a new backpressure channel; capacity is at least one
    pub fn new(capacity: usize, drop_policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);

        Self {
            capacity,
            drop_policy,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            item_ready: Notify::new(),
            space_ready: Notify::new(),
            closed: AtomicBool::new(false),
            dropped_count: AtomicU64::new(0),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send an event, applying the drop policy when full
    ///
    /// Fails only once the channel is closed.
    pub async fn send(&self, event: T) -> Result<(), String> {
        let mut event = Some(event);

        loop {
            let space = self.space_ready.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            if self.is_closed() {
                return Err("Channel closed".to_string());
            }

            let must_wait = {
                let mut buffer = self.buffer();
                let mut must_wait = false;

                if buffer.len() >= self.capacity {
                    match self.drop_policy {
                        DropPolicy::DropOldest => {
                            buffer.pop_front();
                            self.dropped_count.fetch_add(1, Ordering::Relaxed);
                            debug!("Dropped oldest event due to backpressure");
                        }
                        DropPolicy::DropNewest => {
                            self.dropped_count.fetch_add(1, Ordering::Relaxed);
                            debug!("Dropped newest event due to backpressure");
                            return Ok(());
                        }
                        DropPolicy::Block => must_wait = true,
                    }
                }

                if !must_wait {
                    if let Some(event) = event.take() {
                        buffer.push_back(event);
                    }
                }
                must_wait
            };

            if must_wait {
                warn!("Backpressure channel is full, blocking...");
                space.await;
                continue;
            }

            self.item_ready.notify_one();
            return Ok(());
        }
    }

    /// Receive the next event; `None` once closed and drained
    pub async fn recv(&self) -> Option<T> {
        loop {
            let ready = self.item_ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            if let Some(event) = self.try_recv() {
                return Some(event);
            }

            if self.is_closed() {
                return None;
            }

            ready.await;
        }
    }

    /// Try to receive without waiting
    pub fn try_recv(&self) -> Option<T> {
        let event = self.buffer().pop_front();
        if event.is_some() {
            self.space_ready.notify_one();
        }
        event
    }

    /// Stop accepting events and wake every waiter
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.item_ready.notify_waiters();
        self.space_ready.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get current buffer size
    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get number of dropped events
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
