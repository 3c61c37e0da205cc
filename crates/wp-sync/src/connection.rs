use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use wp_types::WalletAddress;
use wp_wallet::WalletProvider;

use crate::error::WaveError;
use crate::notices::NoticeBoard;

/// A successful connection. `generation` increases with every connection
/// so late results from an older session can be recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub account: WalletAddress,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct ConnectionState {
    account: Option<WalletAddress>,
    generation: u64,
}

/// Which account, if any, this client acts for.
pub struct Connection {
    provider: Option<Arc<dyn WalletProvider>>,
    state: RwLock<ConnectionState>,
    notices: NoticeBoard,
}

impl Connection {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, notices: NoticeBoard) -> Self {
        Self {
            provider,
            state: RwLock::new(ConnectionState::default()),
            notices,
        }
    }

    pub fn provider(&self) -> Option<&Arc<dyn WalletProvider>> {
        self.provider.as_ref()
    }

    pub async fn account(&self) -> Option<WalletAddress> {
        self.state.read().await.account.clone()
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn is_current(&self, generation: u64) -> bool {
        self.generation().await == generation
    }

    /// Picks up an account the wallet already authorized, without
    /// prompting. Provider errors are logged and swallowed.
    pub async fn check_silently(&self) -> Option<Session> {
        let Some(provider) = self.provider.as_ref() else {
            self.report(&WaveError::ProviderAbsent).await;
            return None;
        };

        let accounts = match provider.current_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!("silent account check failed: {err}");
                return None;
            }
        };

        match accounts.into_iter().next() {
            Some(account) => {
                info!("found authorized account {account}");
                Some(self.establish(account).await)
            }
            None => {
                info!("no authorized account found");
                None
            }
        }
    }

    /// Prompts the wallet for access. On failure the state is unchanged and
    /// a notice is raised.
    pub async fn connect(&self) -> Result<Session, WaveError> {
        let Some(provider) = self.provider.as_ref() else {
            self.report(&WaveError::ProviderAbsent).await;
            return Err(WaveError::ProviderAbsent);
        };

        let accounts = match provider.request_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                let err = WaveError::from_connect(err);
                self.report(&err).await;
                return Err(err);
            }
        };

        let Some(account) = accounts.into_iter().next() else {
            let err = WaveError::UserRejected("wallet returned no accounts".to_owned());
            self.report(&err).await;
            return Err(err);
        };

        info!("connected account {account}");
        Ok(self.establish(account).await)
    }

    async fn establish(&self, account: WalletAddress) -> Session {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.account = Some(account.clone());
        Session {
            account,
            generation: state.generation,
        }
    }

    async fn report(&self, err: &WaveError) {
        warn!("{err}");
        let message = match err {
            WaveError::ProviderAbsent => "No wallet found. Please install a wallet to continue.".to_owned(),
            other => other.to_string(),
        };
        self.notices.raise(err.notice_kind(), message).await;
    }
}
