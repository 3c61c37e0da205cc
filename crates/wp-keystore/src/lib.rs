use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Sealed key material for one local account plus whether the user has
/// authorized this client to see it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletKeyRecord {
    pub wallet_address: String,
    pub encrypted_key: Vec<u8>,
    pub authorized: bool,
    pub authorized_at_epoch_ms: Option<u128>,
}

#[async_trait]
pub trait Keystore: Send + Sync {
    async fn save_wallet(&self, record: WalletKeyRecord) -> Result<()>;
    async fn load_wallet(&self, wallet_address: &str) -> Result<Option<WalletKeyRecord>>;
    /// Records ordered by wallet address.
    async fn list_wallets(&self) -> Result<Vec<WalletKeyRecord>>;
}

#[async_trait]
impl<T> Keystore for Arc<T>
where
    T: Keystore + ?Sized,
{
    async fn save_wallet(&self, record: WalletKeyRecord) -> Result<()> {
        (**self).save_wallet(record).await
    }

    async fn load_wallet(&self, wallet_address: &str) -> Result<Option<WalletKeyRecord>> {
        (**self).load_wallet(wallet_address).await
    }

    async fn list_wallets(&self) -> Result<Vec<WalletKeyRecord>> {
        (**self).list_wallets().await
    }
}

#[derive(Default)]
pub struct InMemoryKeystore {
    wallets: RwLock<BTreeMap<String, WalletKeyRecord>>,
}

#[async_trait]
impl Keystore for InMemoryKeystore {
    async fn save_wallet(&self, record: WalletKeyRecord) -> Result<()> {
        let mut guard = self.wallets.write().await;
        guard.insert(record.wallet_address.clone(), record);
        Ok(())
    }

    async fn load_wallet(&self, wallet_address: &str) -> Result<Option<WalletKeyRecord>> {
        let guard = self.wallets.read().await;
        Ok(guard.get(wallet_address).cloned())
    }

    async fn list_wallets(&self) -> Result<Vec<WalletKeyRecord>> {
        let guard = self.wallets.read().await;
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeystoreFile {
    #[serde(default)]
    wallets: BTreeMap<String, WalletKeyRecord>,
}

/// Keystore backed by a single JSON file, rewritten through a temp file on
/// every save.
pub struct FileKeystore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeystore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_file(&self) -> Result<KeystoreFile> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) if raw.is_empty() => Ok(KeystoreFile::default()),
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse keystore file {}", self.path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("keystore file {} not found, starting empty", self.path.display());
                Ok(KeystoreFile::default())
            }
            Err(err) => Err(err)
                .with_context(|| format!("failed to read keystore file {}", self.path.display())),
        }
    }

    async fn write_file(&self, file: &KeystoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let value = serde_json::to_vec_pretty(file)?;
        tokio::fs::write(&tmp_path, value)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl Keystore for FileKeystore {
    async fn save_wallet(&self, record: WalletKeyRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.read_file().await?;
        file.wallets.insert(record.wallet_address.clone(), record);
        self.write_file(&file).await
    }

    async fn load_wallet(&self, wallet_address: &str) -> Result<Option<WalletKeyRecord>> {
        let file = self.read_file().await?;
        Ok(file.wallets.get(wallet_address).cloned())
    }

    async fn list_wallets(&self) -> Result<Vec<WalletKeyRecord>> {
        let file = self.read_file().await?;
        Ok(file.wallets.into_values().collect())
    }
}
