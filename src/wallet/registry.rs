//! Durable registry of managed wallets
//!
//! Each wallet lives in its own `wallet_<prefix>.json` record inside the
//! storage directory. The durable store is authoritative: a crash between an
//! in-memory update and its write leaves the two out of sync until the next
//! `load`, which rebuilds memory from disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::types::{record_file_name, short_id, ManagedWallet, SecretKey, WalletRecord};

/// Registry of managed wallets backed by one file per wallet
pub struct WalletRegistry {
    /// Directory holding the record files
    storage_dir: PathBuf,

    /// Wallets in load order (creation order, new wallets appended)
    wallets: RwLock<Vec<ManagedWallet>>,
}

impl WalletRegistry {
    /// Load every wallet record from the storage directory
    ///
    /// Unreadable records are skipped with a warning rather than failing the load.
    pub fn load(storage_dir: &Path) -> Result<Self> {
        fs::create_dir_all(storage_dir).map_err(|e| {
            Error::Storage(format!(
                "Failed to create wallet directory {}: {}",
                storage_dir.display(),
                e
            ))
        })?;

        let entries = fs::read_dir(storage_dir).map_err(|e| {
            Error::Storage(format!(
                "Failed to read wallet directory {}: {}",
                storage_dir.display(),
                e
            ))
        })?;

        let mut wallets = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }

            match read_record(&path) {
                Ok(record) => wallets.push(ManagedWallet::from(record)),
                Err(e) => warn!("Skipping wallet record {}: {}", path.display(), e),
            }
        }

        wallets.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        info!(
            "Loaded {} wallets from {}",
            wallets.len(),
            storage_dir.display()
        );

        Ok(Self {
            storage_dir: storage_dir.to_path_buf(),
            wallets: RwLock::new(wallets),
        })
    }

    /// Register a keypair and persist its record before returning
    pub fn create(&self, keypair: &Keypair, label: Option<String>) -> Result<ManagedWallet> {
        let public_key = keypair.pubkey().to_string();

        let mut wallets = self
            .wallets
            .write()
            .map_err(|e| Error::Storage(format!("Registry lock poisoned: {}", e)))?;

        if wallets.iter().any(|w| w.public_key == public_key) {
            return Err(Error::WalletExists(public_key));
        }

        let wallet = ManagedWallet {
            public_key,
            secret: SecretKey::from_keypair(keypair),
            label,
            created_at: Utc::now(),
            last_used_at: None,
            cached_balance: 0,
        };

        // Another wallet sharing the file prefix would be overwritten
        let path = self.record_path(&wallet.public_key);
        if path.exists() {
            return Err(Error::Storage(format!(
                "Record file {} already exists for another wallet",
                path.display()
            )));
        }

        if let Err(e) = self.write_record(&wallet) {
            // Partial write or failed chmod; memory never saw this wallet
            if let Err(remove_err) = fs::remove_file(&path) {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to clean up {}: {}", path.display(), remove_err);
                }
            }
            return Err(e);
        }
        wallets.push(wallet.clone());

        info!("Created wallet {}", wallet.public_key);
        Ok(wallet)
    }

    /// Generate a fresh keypair and register it
    pub fn generate(&self, label: Option<String>) -> Result<ManagedWallet> {
        self.create(&Keypair::new(), label)
    }

    pub fn get(&self, id: &str) -> Option<ManagedWallet> {
        let wallets = self.wallets.read().unwrap_or_else(|e| e.into_inner());
        wallets.iter().find(|w| w.public_key == id).cloned()
    }

    /// All wallets in load order
    pub fn list(&self) -> Vec<ManagedWallet> {
        self.wallets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Public keys of all wallets in load order
    pub fn ids(&self) -> Vec<String> {
        self.wallets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|w| w.public_key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a fresh balance and touch `last_used_at`
    ///
    /// Unknown ids are ignored.
    pub fn update_balance(&self, id: &str, lamports: u64) -> Result<()> {
        let mut wallets = self
            .wallets
            .write()
            .map_err(|e| Error::Storage(format!("Registry lock poisoned: {}", e)))?;

        let Some(wallet) = wallets.iter_mut().find(|w| w.public_key == id) else {
            debug!("Balance update for unknown wallet {} ignored", short_id(id));
            return Ok(());
        };

        wallet.cached_balance = lamports;
        wallet.last_used_at = Some(Utc::now());

        let snapshot = wallet.clone();
        self.write_record(&snapshot)
    }

    /// Remove a wallet's record and in-memory entry
    ///
    /// Returns `Ok(false)` when no such wallet exists.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut wallets = self
            .wallets
            .write()
            .map_err(|e| Error::Storage(format!("Registry lock poisoned: {}", e)))?;

        let Some(index) = wallets.iter().position(|w| w.public_key == id) else {
            return Ok(false);
        };

        self.remove_record(id)?;
        wallets.remove(index);

        info!("Deleted wallet {}", id);
        Ok(true)
    }

    /// Remove every wallet, returning how many were deleted
    ///
    /// Keeps going past individual failures; wallets whose record could not
    /// be removed stay registered and the first error is returned.
    pub fn delete_all(&self) -> Result<usize> {
        let mut wallets = self
            .wallets
            .write()
            .map_err(|e| Error::Storage(format!("Registry lock poisoned: {}", e)))?;

        let mut first_error = None;
        let mut removed = 0;

        wallets.retain(|wallet| match self.remove_record(&wallet.public_key) {
            Ok(()) => {
                removed += 1;
                false
            }
            Err(e) => {
                warn!("Failed to delete wallet {}: {}", wallet.short_id(), e);
                first_error.get_or_insert(e);
                true
            }
        });

        info!("Deleted {} wallets", removed);

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Decode a wallet's keypair for signing
    ///
    /// Returns `None` for unknown wallets and undecodable material.
    pub(crate) fn resolve_signing_material(&self, id: &str) -> Option<Keypair> {
        let wallet = self.get(id)?;

        match wallet.secret.to_keypair() {
            Ok(keypair) if keypair.pubkey().to_string() == wallet.public_key => Some(keypair),
            Ok(_) => {
                warn!(
                    "Signing material for {} does not match its public key",
                    wallet.short_id()
                );
                None
            }
            Err(e) => {
                warn!(
                    "Failed to decode signing material for {}: {}",
                    wallet.short_id(),
                    e
                );
                None
            }
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn record_path(&self, public_key: &str) -> PathBuf {
        self.storage_dir.join(record_file_name(public_key))
    }

    fn write_record(&self, wallet: &ManagedWallet) -> Result<()> {
        let record = WalletRecord::from(wallet);
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| Error::Storage(format!("Failed to serialize wallet record: {}", e)))?;

        let path = self.record_path(&wallet.public_key);
        fs::write(&path, json)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", path.display(), e)))?;

        // Records hold signing material
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                Error::Storage(format!("Failed to restrict {}: {}", path.display(), e))
            })?;
        }

        debug!("Saved wallet record {}", path.display());
        Ok(())
    }

    fn remove_record(&self, public_key: &str) -> Result<()> {
        let path = self.record_path(public_key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            // Already gone on disk; memory is the only copy left to drop
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

fn is_record_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("wallet_") && n.ends_with(".json"))
            .unwrap_or(false)
}

fn read_record(path: &Path) -> Result<WalletRecord> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Storage(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Storage(format!("Failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_empty_registry() {
        let dir = tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_persists_and_reloads_in_order() {
        let dir = tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path()).unwrap();

        let first = registry.generate(Some("first".into())).unwrap();
        let second = registry.generate(None).unwrap();

        assert!(dir.path().join(first.record_file_name()).exists());

        let reloaded = WalletRegistry::load(dir.path()).unwrap();
        assert_eq!(reloaded.ids(), vec![first.public_key.clone(), second.public_key]);
        assert_eq!(
            reloaded.get(&first.public_key).unwrap().label.as_deref(),
            Some("first")
        );
    }

    #[test]
    fn test_create_write_failure_leaves_registry_unchanged() {
        let dir = tempdir().unwrap();
        let storage = dir.path().join("wallets");
        let registry = WalletRegistry::load(&storage).unwrap();
        registry.generate(None).unwrap();

        fs::remove_dir_all(&storage).unwrap();

        let keypair = Keypair::new();
        let result = registry.create(&keypair, Some("lost".to_string()));
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&keypair.pubkey().to_string()).is_none());
        assert!(!storage.join(record_file_name(&keypair.pubkey().to_string())).exists());
    }

    #[test]
    fn test_duplicate_wallet_rejected() {
        let dir = tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path()).unwrap();

        let keypair = Keypair::new();
        registry.create(&keypair, None).unwrap();

        assert!(matches!(
            registry.create(&keypair, None),
            Err(Error::WalletExists(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_delete_then_get_returns_none() {
        let dir = tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path()).unwrap();

        let a = registry.generate(None).unwrap();
        registry.generate(None).unwrap();
        let before = registry.list().len();

        assert!(registry.delete(&a.public_key).unwrap());
        assert!(registry.get(&a.public_key).is_none());
        assert_eq!(registry.list().len(), before - 1);
        assert!(!dir.path().join(a.record_file_name()).exists());

        // Second delete finds nothing
        assert!(!registry.delete(&a.public_key).unwrap());
    }

    #[test]
    fn test_delete_all_clears_disk_and_memory() {
        let dir = tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path()).unwrap();
        for _ in 0..3 {
            registry.generate(None).unwrap();
        }

        assert_eq!(registry.delete_all().unwrap(), 3);
        assert!(registry.is_empty());
        assert!(WalletRegistry::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_update_balance_persists_and_ignores_unknown() {
        let dir = tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path()).unwrap();
        let wallet = registry.generate(None).unwrap();

        registry.update_balance(&wallet.public_key, 1_500_000_000).unwrap();
        registry.update_balance("unknown-wallet", 1).unwrap();

        let reloaded = WalletRegistry::load(dir.path()).unwrap();
        let stored = reloaded.get(&wallet.public_key).unwrap();
        assert_eq!(stored.cached_balance, 1_500_000_000);
        assert!(stored.last_used_at.is_some());
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_resolve_signing_material() {
        let dir = tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path()).unwrap();
        let keypair = Keypair::new();
        let wallet = registry.create(&keypair, None).unwrap();

        let resolved = registry.resolve_signing_material(&wallet.public_key).unwrap();
        assert_eq!(resolved.pubkey(), keypair.pubkey());
        assert!(registry.resolve_signing_material("missing").is_none());
    }

    #[test]
    fn test_corrupt_secret_resolves_to_none() {
        let dir = tempdir().unwrap();
        let record = WalletRecord {
            public_key: "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK".into(),
            secret_key: "not-base64!".into(),
            label: None,
            created_at: Utc::now(),
            last_used: None,
            balance: 0,
        };
        fs::write(
            dir.path().join(record_file_name(&record.public_key)),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();

        let registry = WalletRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry
            .resolve_signing_material(&record.public_key)
            .is_none());
    }

    #[test]
    fn test_unparseable_record_is_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("wallet_garbage.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = WalletRegistry::load(dir.path()).unwrap();
        assert!(registry.is_empty());
    }
}
