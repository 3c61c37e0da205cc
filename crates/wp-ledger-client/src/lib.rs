use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use wp_types::{SignedWave, TxHash, WireEntry};

mod memory;

pub use memory::InMemoryLedger;

/// Live `NewWave` notifications. The stream ends when the sender side is
/// dropped; dropping the receiver detaches the listener.
pub type EntryFeed = mpsc::UnboundedReceiver<WireEntry>;

#[derive(Debug, Clone)]
pub struct SubmitWaveRequest {
    pub wave: SignedWave,
    /// Forwarded to the node untouched (gas limit on EVM ledgers).
    pub fee_hint: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SubmitWaveReceipt {
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed,
    Reverted(String),
}

/// The deployed wave log contract.
#[async_trait]
pub trait LedgerContract: Send + Sync {
    fn contract_address(&self) -> &str;
    async fn get_all_entries(&self) -> Result<Vec<WireEntry>>;
    async fn get_total_count(&self) -> Result<u64>;
    async fn submit(&self, req: SubmitWaveRequest) -> Result<SubmitWaveReceipt>;
    /// Resolves once `tx_hash` is mined. An `Err` means the wait itself
    /// failed, not that the transaction reverted.
    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxOutcome>;
    async fn subscribe(&self) -> Result<EntryFeed>;
}
