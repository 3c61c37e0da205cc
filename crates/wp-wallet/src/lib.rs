//! Wallet provider seam.
//!
//! `WalletProvider` is what the sync core talks to; `LocalWallet` is the
//! keystore-backed implementation that stands in for a browser extension.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use wp_crypto::{
    Ed25519Signer, Signer, decrypt_key_material, encrypt_key_material, to_hex, wave_payload,
};
use wp_keystore::{Keystore, WalletKeyRecord};
use wp_types::{SignedWave, WalletAddress};

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("request rejected by user")]
    Rejected,
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts this client is already authorized for. Never prompts.
    async fn current_accounts(&self) -> Result<Vec<WalletAddress>, WalletError>;
    /// Asks the user to authorize this client.
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, WalletError>;
    async fn sign_wave(
        &self,
        account: &WalletAddress,
        message: &str,
    ) -> Result<SignedWave, WalletError>;
}

/// How `LocalWallet` answers connect and sign prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    AutoApprove,
    Deny,
}

pub struct LocalWallet<K> {
    signer: Ed25519Signer,
    address: WalletAddress,
    keystore: K,
    policy: ApprovalPolicy,
}

impl<K> LocalWallet<K>
where
    K: Keystore,
{
    /// Loads the first account in `keystore`, or creates and stores a fresh
    /// unauthorized one.
    pub async fn open(keystore: K, encryption_key: &str, policy: ApprovalPolicy) -> Result<Self> {
        let existing = keystore.list_wallets().await?.into_iter().next();

        let signer = match existing {
            Some(record) => {
                let secret_key = decrypt_key_material(&record.encrypted_key, encryption_key)?;
                let signer = Ed25519Signer::from_secret_key_bytes(secret_key);
                if signer.wallet_address() != record.wallet_address {
                    return Err(anyhow!(
                        "keystore secret does not unlock wallet {}",
                        record.wallet_address
                    ));
                }
                signer
            }
            None => {
                let signer = Ed25519Signer::new_random();
                let encrypted_key = encrypt_key_material(&signer.secret_key_bytes(), encryption_key)?;
                keystore
                    .save_wallet(WalletKeyRecord {
                        wallet_address: signer.wallet_address(),
                        encrypted_key,
                        authorized: false,
                        authorized_at_epoch_ms: None,
                    })
                    .await?;
                info!("created local wallet {}", signer.wallet_address());
                signer
            }
        };

        Ok(Self {
            address: WalletAddress(signer.wallet_address()),
            signer,
            keystore,
            policy,
        })
    }

    pub fn address(&self) -> &WalletAddress {
        &self.address
    }

    async fn load_record(&self) -> Result<WalletKeyRecord, WalletError> {
        self.keystore
            .load_wallet(&self.address.0)
            .await
            .map_err(|err| WalletError::Unavailable(err.to_string()))?
            .ok_or_else(|| WalletError::Unavailable(format!("wallet {} missing from keystore", self.address)))
    }
}

#[async_trait]
impl<K> WalletProvider for LocalWallet<K>
where
    K: Keystore,
{
    async fn current_accounts(&self) -> Result<Vec<WalletAddress>, WalletError> {
        let record = self.load_record().await?;
        if record.authorized {
            Ok(vec![self.address.clone()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, WalletError> {
        if self.policy == ApprovalPolicy::Deny {
            return Err(WalletError::Rejected);
        }

        let mut record = self.load_record().await?;
        if !record.authorized {
            record.authorized = true;
            record.authorized_at_epoch_ms = Some(epoch_ms());
            self.keystore
                .save_wallet(record)
                .await
                .map_err(|err| WalletError::Unavailable(err.to_string()))?;
        }

        Ok(vec![self.address.clone()])
    }

    async fn sign_wave(
        &self,
        account: &WalletAddress,
        message: &str,
    ) -> Result<SignedWave, WalletError> {
        if account != &self.address {
            warn!("sign request for unknown account {}", account);
            return Err(WalletError::Rejected);
        }
        if self.policy == ApprovalPolicy::Deny || !self.load_record().await?.authorized {
            return Err(WalletError::Rejected);
        }

        let signature = self
            .signer
            .sign(&wave_payload(&account.0, message))
            .map_err(|err| WalletError::Unavailable(err.to_string()))?;

        Ok(SignedWave {
            from: account.clone(),
            message: message.to_owned(),
            public_key: self.signer.public_key_hex(),
            signature: to_hex(&signature),
        })
    }
}

fn epoch_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
