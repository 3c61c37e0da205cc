use tracing::{info, warn};
use wp_ledger_client::LedgerContract;
use wp_types::Entry;

use crate::connection::Connection;
use crate::error::WaveError;
use crate::store::StoreHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Applied { entries: usize, total_count: u64 },
    /// A newer session started while the reads were in flight.
    Stale,
}

/// Bulk-reads the log and its count, then primes the store for
/// `generation`. On any read error the store is left as it was.
pub async fn bootstrap(
    ledger: &dyn LedgerContract,
    store: &StoreHandle,
    connection: &Connection,
    generation: u64,
) -> Result<BootstrapOutcome, WaveError> {
    let wire = ledger.get_all_entries().await.map_err(WaveError::read)?;
    let total_count = ledger.get_total_count().await.map_err(WaveError::read)?;

    let entries: Vec<Entry> = wire
        .into_iter()
        .filter_map(|record| {
            let waver = record.waver.clone();
            let timestamp = record.timestamp;
            let entry = Entry::from_wire(record);
            if entry.is_none() {
                warn!("skipping malformed wave from {waver:?} at {timestamp}");
            }
            entry
        })
        .collect();

    if !connection.is_current(generation).await {
        info!("discarding bootstrap for session {generation}, a newer session is active");
        return Ok(BootstrapOutcome::Stale);
    }

    let parsed = entries.len();
    let dropped = store.prime(entries, total_count).await;
    if dropped > 0 {
        warn!("bulk read contained {dropped} duplicate waves");
    }
    let kept = parsed - dropped;
    info!("bootstrapped {kept} waves, total count {total_count}");
    Ok(BootstrapOutcome::Applied {
        entries: kept,
        total_count,
    })
}
