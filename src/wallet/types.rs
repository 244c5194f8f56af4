//! Core types for managed wallets
//!
//! Defines the in-memory wallet view and its durable record format.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Keypair;

/// Number of public key characters used to name a wallet's record file
pub const RECORD_PREFIX_LEN: usize = 8;

/// Opaque signing material, base64 of the 64-byte keypair
///
/// Never printed: `Debug` is redacted and there is no `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn from_keypair(keypair: &Keypair) -> Self {
        Self(BASE64.encode(keypair.to_bytes()))
    }

    pub(crate) fn from_encoded(encoded: String) -> Self {
        Self(encoded)
    }

    pub(crate) fn encoded(&self) -> &str {
        &self.0
    }

    /// Decode back into a keypair
    pub(crate) fn to_keypair(&self) -> Result<Keypair, String> {
        let bytes = BASE64
            .decode(self.0.as_bytes())
            .map_err(|e| format!("base64 decode failed: {}", e))?;
        Keypair::from_bytes(&bytes).map_err(|e| format!("invalid keypair bytes: {}", e))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A wallet managed by the registry
#[derive(Debug, Clone)]
pub struct ManagedWallet {
    /// Base58 public key, unique across the registry
    pub public_key: String,

    /// Signing material; only the trade path decodes it
    pub(crate) secret: SecretKey,

    /// Optional human-readable label
    pub label: Option<String>,

    /// When the wallet was generated
    pub created_at: DateTime<Utc>,

    /// Last balance refresh or trade settlement
    pub last_used_at: Option<DateTime<Utc>>,

    /// Cached native balance in lamports
    pub cached_balance: u64,
}

impl ManagedWallet {
    /// Abbreviated address for log lines
    pub fn short_id(&self) -> &str {
        short_id(&self.public_key)
    }

    /// Record file name, keyed by a fixed-length prefix of the public key
    pub fn record_file_name(&self) -> String {
        record_file_name(&self.public_key)
    }
}

/// Durable wallet record, one JSON file per wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub public_key: String,

    /// Base64-encoded keypair bytes
    pub secret_key: String,

    #[serde(default)]
    pub label: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,

    #[serde(default)]
    pub balance: u64,
}

impl From<&ManagedWallet> for WalletRecord {
    fn from(wallet: &ManagedWallet) -> Self {
        Self {
            public_key: wallet.public_key.clone(),
            secret_key: wallet.secret.encoded().to_string(),
            label: wallet.label.clone(),
            created_at: wallet.created_at,
            last_used: wallet.last_used_at,
            balance: wallet.cached_balance,
        }
    }
}

impl From<WalletRecord> for ManagedWallet {
    fn from(record: WalletRecord) -> Self {
        Self {
            public_key: record.public_key,
            secret: SecretKey::from_encoded(record.secret_key),
            label: record.label,
            created_at: record.created_at,
            last_used_at: record.last_used,
            cached_balance: record.balance,
        }
    }
}

/// First `RECORD_PREFIX_LEN` characters of an address
pub fn short_id(public_key: &str) -> &str {
    let end = public_key
        .char_indices()
        .nth(RECORD_PREFIX_LEN)
        .map(|(idx, _)| idx)
        .unwrap_or(public_key.len());
    &public_key[..end]
}

pub fn record_file_name(public_key: &str) -> String {
    format!("wallet_{}.json", short_id(public_key))
}
