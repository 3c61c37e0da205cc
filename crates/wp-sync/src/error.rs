use wp_types::NoticeKind;
use wp_wallet::WalletError;

/// Everything that can go wrong in a connect, bootstrap or wave. Each one is
/// caught at the operation boundary, logged and turned into a notice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaveError {
    #[error("no wallet provider installed")]
    ProviderAbsent,
    #[error("request declined: {0}")]
    UserRejected(String),
    #[error("ledger read failed: {0}")]
    ReadFailure(String),
    #[error("submission failed: {0}")]
    SubmitFailure(String),
    #[error("confirmation failed: {0}")]
    ConfirmFailure(String),
}

impl WaveError {
    pub(crate) fn read(err: anyhow::Error) -> Self {
        WaveError::ReadFailure(format!("{err:#}"))
    }

    pub fn notice_kind(&self) -> NoticeKind {
        match self {
            WaveError::ProviderAbsent => NoticeKind::WalletNotFound,
            WaveError::UserRejected(_) => NoticeKind::ConnectionDeclined,
            WaveError::ReadFailure(_) => NoticeKind::ReadFailed,
            WaveError::SubmitFailure(_) | WaveError::ConfirmFailure(_) => {
                NoticeKind::SubmissionFailed
            }
        }
    }

    pub(crate) fn from_connect(err: WalletError) -> Self {
        match err {
            WalletError::Rejected => WaveError::UserRejected("connection request declined".to_owned()),
            WalletError::Unavailable(detail) => {
                WaveError::UserRejected(format!("connection request failed: {detail}"))
            }
        }
    }

    pub(crate) fn from_sign(err: WalletError) -> Self {
        match err {
            WalletError::Rejected => WaveError::UserRejected("signature request declined".to_owned()),
            WalletError::Unavailable(detail) => WaveError::SubmitFailure(detail),
        }
    }
}

/// Why a wave was not attempted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaveBlocked {
    #[error("no wallet account connected")]
    NotConnected,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("a wave is already in flight")]
    Busy,
}
