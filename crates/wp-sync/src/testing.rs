//! Fakes shared by the unit tests in this crate.

use async_trait::async_trait;
use std::sync::Mutex;
use wp_types::{SignedWave, WalletAddress};
use wp_wallet::{WalletError, WalletProvider};

/// Wallet whose answers are fixed up front.
pub(crate) struct ScriptedWallet {
    pub authorized: Mutex<Vec<WalletAddress>>,
    pub approve: bool,
    pub fail_silent: bool,
    pub fail_sign: bool,
}

impl ScriptedWallet {
    pub(crate) fn authorized(account: &str) -> Self {
        Self {
            authorized: Mutex::new(vec![WalletAddress(account.to_owned())]),
            approve: true,
            fail_silent: false,
            fail_sign: false,
        }
    }

    pub(crate) fn unauthorized(approve: bool) -> Self {
        Self {
            authorized: Mutex::new(Vec::new()),
            approve,
            fail_silent: false,
            fail_sign: false,
        }
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn current_accounts(&self) -> Result<Vec<WalletAddress>, WalletError> {
        if self.fail_silent {
            return Err(WalletError::Unavailable("provider crashed".to_owned()));
        }
        Ok(self.authorized.lock().unwrap().clone())
    }

    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, WalletError> {
        if !self.approve {
            return Err(WalletError::Rejected);
        }
        let mut authorized = self.authorized.lock().unwrap();
        if authorized.is_empty() {
            authorized.push(WalletAddress("0xnew".to_owned()));
        }
        Ok(authorized.clone())
    }

    async fn sign_wave(
        &self,
        account: &WalletAddress,
        message: &str,
    ) -> Result<SignedWave, WalletError> {
        if self.fail_sign {
            return Err(WalletError::Rejected);
        }
        Ok(SignedWave {
            from: account.clone(),
            message: message.to_owned(),
            public_key: "00".repeat(32),
            signature: "00".repeat(64),
        })
    }
}

/// Re-evaluates `$cond` until it holds, sleeping briefly so other tasks
/// can run in between.
macro_rules! eventually {
    ($cond:expr) => {{
        let mut reached = false;
        for _ in 0..200 {
            if $cond {
                reached = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(reached, "condition not reached in time: {}", stringify!($cond));
    }};
}

pub(crate) use eventually;
