//! In-process wave log used for local development and tests.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use wp_types::{SignedWave, TxHash, WireEntry};

use crate::{EntryFeed, LedgerContract, SubmitWaveReceipt, SubmitWaveRequest, TxOutcome};

/// Settled receipts remembered for late `wait_for_receipt` callers.
const SETTLED_RECEIPTS_KEPT: usize = 1024;

#[derive(Default)]
struct LedgerState {
    entries: Vec<WireEntry>,
    pending_receipts: HashMap<TxHash, watch::Sender<Option<TxOutcome>>>,
    settled: HashMap<TxHash, TxOutcome>,
    settled_order: VecDeque<TxHash>,
    pending: Vec<(TxHash, SignedWave)>,
    subscribers: Vec<mpsc::UnboundedSender<WireEntry>>,
    clock: Option<i64>,
    nonce: u64,
    manual_mining: bool,
    fail_reads: bool,
    fail_submits: bool,
    fail_receipts: bool,
    fail_subscribe: bool,
}

impl LedgerState {
    fn now(&self) -> i64 {
        self.clock.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs() as i64)
                .unwrap_or_default()
        })
    }

    fn append(&mut self, entry: WireEntry) {
        self.entries.push(entry.clone());
        self.broadcast(entry);
    }

    fn broadcast(&mut self, entry: WireEntry) {
        self.subscribers.retain(|tx| tx.send(entry.clone()).is_ok());
    }

    fn resolve(&mut self, tx_hash: &TxHash, outcome: TxOutcome) {
        if let Some(sender) = self.pending_receipts.remove(tx_hash) {
            sender.send_replace(Some(outcome.clone()));
        }
        self.settled.insert(tx_hash.clone(), outcome);
        self.settled_order.push_back(tx_hash.clone());
        while self.settled_order.len() > SETTLED_RECEIPTS_KEPT {
            if let Some(evicted) = self.settled_order.pop_front() {
                self.settled.remove(&evicted);
            }
        }
    }

    fn mine(&mut self, tx_hash: TxHash, wave: SignedWave) {
        let entry = WireEntry {
            waver: wave.from.0,
            timestamp: self.now(),
            message: wave.message,
        };
        self.append(entry);
        self.resolve(&tx_hash, TxOutcome::Confirmed);
        debug!("mined {}", tx_hash);
    }
}

/// A wave log held in memory. Submissions are mined immediately unless
/// manual mining is switched on.
pub struct InMemoryLedger {
    address: String,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends history without notifying subscribers.
    pub fn seed(&self, entries: impl IntoIterator<Item = WireEntry>) {
        self.state().entries.extend(entries);
    }

    /// A wave sent by some other client: logged and broadcast.
    pub fn record_wave(&self, from: &str, message: &str) -> WireEntry {
        let mut state = self.state();
        let entry = WireEntry {
            waver: from.to_owned(),
            timestamp: state.now(),
            message: message.to_owned(),
        };
        state.append(entry.clone());
        entry
    }

    /// Delivers a notification without touching the log.
    pub fn push_event(&self, entry: WireEntry) {
        self.state().broadcast(entry);
    }

    pub fn set_clock(&self, seconds: Option<i64>) {
        self.state().clock = seconds;
    }

    pub fn set_manual_mining(&self, manual: bool) {
        self.state().manual_mining = manual;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    pub fn set_fail_submits(&self, fail: bool) {
        self.state().fail_submits = fail;
    }

    pub fn set_fail_receipts(&self, fail: bool) {
        self.state().fail_receipts = fail;
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state().fail_subscribe = fail;
    }

    /// Mines every pending submission in submission order.
    pub fn mine_pending(&self) -> usize {
        let mut state = self.state();
        let pending = std::mem::take(&mut state.pending);
        let mined = pending.len();
        for (tx_hash, wave) in pending {
            state.mine(tx_hash, wave);
        }
        mined
    }

    /// Reverts every pending submission; nothing is logged.
    pub fn revert_pending(&self, reason: &str) -> usize {
        let mut state = self.state();
        let pending = std::mem::take(&mut state.pending);
        let reverted = pending.len();
        for (tx_hash, _) in pending {
            state.resolve(&tx_hash, TxOutcome::Reverted(reason.to_owned()));
        }
        reverted
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Receipts still held: every pending one plus recent settled ones.
    pub fn receipt_count(&self) -> usize {
        let state = self.state();
        state.pending_receipts.len() + state.settled.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    pub fn entries(&self) -> Vec<WireEntry> {
        self.state().entries.clone()
    }
}

#[async_trait]
impl LedgerContract for InMemoryLedger {
    fn contract_address(&self) -> &str {
        &self.address
    }

    async fn get_all_entries(&self) -> Result<Vec<WireEntry>> {
        let state = self.state();
        if state.fail_reads {
            bail!("ledger read unavailable");
        }
        Ok(state.entries.clone())
    }

    async fn get_total_count(&self) -> Result<u64> {
        let state = self.state();
        if state.fail_reads {
            bail!("ledger read unavailable");
        }
        Ok(state.entries.len() as u64)
    }

    async fn submit(&self, req: SubmitWaveRequest) -> Result<SubmitWaveReceipt> {
        let mut state = self.state();
        if state.fail_submits {
            bail!("node rejected transaction");
        }

        state.nonce += 1;
        let digest = Sha256::digest(
            format!("{}:{}:{}", req.wave.from, req.wave.message, state.nonce).as_bytes(),
        );
        let tx_hash = TxHash(format!("0x{}", hex::encode(digest)));
        let (sender, _) = watch::channel(None);
        state.pending_receipts.insert(tx_hash.clone(), sender);

        if state.manual_mining {
            state.pending.push((tx_hash.clone(), req.wave));
        } else {
            state.mine(tx_hash.clone(), req.wave);
        }

        Ok(SubmitWaveReceipt { tx_hash })
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxOutcome> {
        let mut receiver = {
            let state = self.state();
            if state.fail_receipts {
                bail!("receipt lookup failed for {tx_hash}");
            }
            if let Some(outcome) = state.settled.get(tx_hash) {
                return Ok(outcome.clone());
            }
            state
                .pending_receipts
                .get(tx_hash)
                .map(watch::Sender::subscribe)
                .ok_or_else(|| anyhow!("unknown transaction {tx_hash}"))?
        };

        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| anyhow!("ledger closed while waiting for {tx_hash}"))?;
        (*outcome)
            .clone()
            .ok_or_else(|| anyhow!("receipt for {tx_hash} missing"))
    }

    async fn subscribe(&self) -> Result<EntryFeed> {
        let mut state = self.state();
        if state.fail_subscribe {
            bail!("event subscription refused");
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(tx);
        Ok(rx)
    }
}
