//! Copy trading of a watched wallet
//!
//! Log notifications for the watched account are classified with
//! heuristics, sized against the configured multipliers and cap, and
//! replayed as buys across every managed wallet.

pub mod classifier;
pub mod config;
pub mod engine;
pub mod sizing;
pub mod subscription;

pub use classifier::{DetectedSourceTrade, Direction, LogHeuristicClassifier, TradeClassifier};
pub use config::CopyTradeConfig;
pub use engine::{CopyTradeEngine, EngineState, EngineStatus};
pub use sizing::{replica_sol_amount, scaled_priority_fee, size_replica, ReplicaOrder};
pub use subscription::{LogNotification, LogSubscriber, LogSubscription, PubsubLogSubscriber};
