use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress(pub String);

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Submitted,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }
}

/// A wave as the contract returns it from `getAllWaves` and the
/// `NewWave` event feed. `timestamp` is seconds since epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireEntry {
    pub waver: String,
    pub timestamp: i64,
    #[serde(default)]
    pub message: String,
}

/// One logged wave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub sender: WalletAddress,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Identity of a wave. The wire carries no id, so two entries with the same
/// sender, timestamp and message are the same logical event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub sender: WalletAddress,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Entry {
    /// Returns `None` when the record has no sender or its timestamp is out
    /// of the representable range.
    pub fn from_wire(wire: WireEntry) -> Option<Self> {
        if wire.waver.trim().is_empty() {
            return None;
        }
        let timestamp = DateTime::<Utc>::from_timestamp(wire.timestamp, 0)?;
        Some(Self {
            sender: WalletAddress(wire.waver),
            timestamp,
            message: wire.message,
        })
    }

    pub fn key(&self) -> EntryKey {
        EntryKey {
            sender: self.sender.clone(),
            timestamp: self.timestamp,
            message: self.message.clone(),
        }
    }
}

/// A wave authorized by the wallet's signer, ready for the ledger.
/// `public_key` and `signature` are lowercase hex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedWave {
    pub from: WalletAddress,
    pub message: String,
    pub public_key: String,
    pub signature: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    WalletNotFound,
    ConnectionDeclined,
    ReadFailed,
    SubmissionFailed,
}

/// A dismissible, non-blocking message for the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub kind: NoticeKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

// ── Client HTTP surface ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WavesResponse {
    pub total_count: Option<u64>,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResponse {
    pub account: Option<String>,
    pub busy: bool,
    pub draft: String,
    pub total_count: Option<u64>,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub connected: bool,
    pub account: Option<String>,
    pub notice: Option<Notice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaveRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveResponse {
    pub status: TxStatus,
    pub tx_hash: Option<String>,
    pub total_count: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticesResponse {
    pub notices: Vec<Notice>,
}
