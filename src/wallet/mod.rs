//! Wallet management module
//!
//! A registry of managed signing identities, persisted one JSON record per
//! wallet.
//!
//! # Security
//!
//! Signing material never leaves the crate: `SecretKey` has no `Display`,
//! its `Debug` is redacted, and only the trade path decodes it.

pub mod registry;
pub mod types;

pub use registry::WalletRegistry;
pub use types::{record_file_name, short_id, ManagedWallet, SecretKey, WalletRecord};
