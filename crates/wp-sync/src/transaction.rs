//! One wave, from signature to confirmation.
//!
//! The lifecycle never inserts its own entry into the store. The confirmed
//! wave reaches the list through the event feed or the next bootstrap; the
//! only store write here is the post-confirmation count refresh.

use tracing::{debug, info, warn};
use wp_ledger_client::{LedgerContract, SubmitWaveRequest, TxOutcome};
use wp_types::{TxHash, TxStatus, WalletAddress};
use wp_wallet::WalletProvider;

use crate::error::WaveError;
use crate::store::StoreHandle;

/// Collaborators a lifecycle borrows for its run.
pub struct WaveContext<'a> {
    pub ledger: &'a dyn LedgerContract,
    pub wallet: &'a dyn WalletProvider,
    pub store: &'a StoreHandle,
    pub fee_hint: Option<u64>,
}

/// How a lifecycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub status: TxStatus,
    pub tx_hash: Option<TxHash>,
    /// Fresh count after confirmation, when the re-query succeeded.
    pub total_count: Option<u64>,
    /// Why the wave failed. Set only when `status` is `Failed`.
    pub error: Option<WaveError>,
    /// The count re-query failed after a confirmed wave.
    pub count_error: Option<WaveError>,
}

/// `None` is idle. Once `Confirmed` or `Failed` is reached the status is
/// frozen.
#[derive(Debug, Default)]
pub struct TransactionLifecycle {
    status: Option<TxStatus>,
    tx_hash: Option<TxHash>,
}

impl TransactionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<TxStatus> {
        self.status
    }

    pub fn tx_hash(&self) -> Option<&TxHash> {
        self.tx_hash.as_ref()
    }

    fn advance(&mut self, next: TxStatus) -> bool {
        if let Some(current) = self.status {
            if current.is_terminal() {
                warn!("ignoring {next:?} after terminal {current:?}");
                return false;
            }
        }
        self.status = Some(next);
        true
    }

    fn fail(mut self, error: WaveError) -> Settlement {
        warn!("wave failed: {error}");
        self.advance(TxStatus::Failed);
        Settlement {
            status: self.status.unwrap_or(TxStatus::Failed),
            tx_hash: self.tx_hash,
            total_count: None,
            error: Some(error),
            count_error: None,
        }
    }

    /// Signs, submits and waits for `message` from `account`.
    pub async fn run(
        mut self,
        ctx: &WaveContext<'_>,
        account: &WalletAddress,
        message: &str,
    ) -> Settlement {
        match ctx.ledger.get_total_count().await {
            Ok(count) => debug!("total count before wave: {count}"),
            Err(err) => debug!("could not read count before wave: {err:#}"),
        }

        let wave = match ctx.wallet.sign_wave(account, message).await {
            Ok(wave) => wave,
            Err(err) => return self.fail(WaveError::from_sign(err)),
        };

        let receipt = match ctx
            .ledger
            .submit(SubmitWaveRequest {
                wave,
                fee_hint: ctx.fee_hint,
            })
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => return self.fail(WaveError::SubmitFailure(format!("{err:#}"))),
        };

        let tx_hash = receipt.tx_hash;
        self.tx_hash = Some(tx_hash.clone());
        self.advance(TxStatus::Submitted);
        info!("wave submitted: {tx_hash}");

        match ctx.ledger.wait_for_receipt(&tx_hash).await {
            Ok(TxOutcome::Confirmed) => {}
            Ok(TxOutcome::Reverted(reason)) => {
                return self.fail(WaveError::ConfirmFailure(format!(
                    "transaction {tx_hash} reverted: {reason}"
                )));
            }
            Err(err) => return self.fail(WaveError::ConfirmFailure(format!("{err:#}"))),
        }

        self.advance(TxStatus::Confirmed);
        info!("wave confirmed: {tx_hash}");

        let (total_count, count_error) = match ctx.ledger.get_total_count().await {
            Ok(count) => {
                ctx.store.set_total_count(count).await;
                info!("total count now {count}");
                (Some(count), None)
            }
            Err(err) => {
                let err = WaveError::read(err);
                warn!("count refresh after {tx_hash} failed: {err}");
                (None, Some(err))
            }
        };

        Settlement {
            status: TxStatus::Confirmed,
            tx_hash: Some(tx_hash),
            total_count,
            error: None,
            count_error,
        }
    }
}
