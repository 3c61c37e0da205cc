use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wp_ledger_client::{EntryFeed, LedgerContract};
use wp_types::{Entry, NoticeKind};

use crate::error::WaveError;
use crate::notices::NoticeBoard;
use crate::store::StoreHandle;

struct Active {
    generation: u64,
    task: JoinHandle<()>,
}

/// The live `NewWave` listener. At most one is attached at a time; it is
/// detached on drop. A feed the ledger closes raises a `ReadFailed` notice.
pub struct EventSubscription {
    store: StoreHandle,
    notices: NoticeBoard,
    active: Mutex<Option<Active>>,
}

impl EventSubscription {
    pub fn new(store: StoreHandle, notices: NoticeBoard) -> Self {
        Self {
            store,
            notices,
            active: Mutex::new(None),
        }
    }

    /// Detaches any current listener, then attaches a new one for
    /// `generation`.
    pub async fn activate(
        &self,
        ledger: &dyn LedgerContract,
        generation: u64,
    ) -> Result<(), WaveError> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.task.abort();
            debug!("detached event listener for session {}", previous.generation);
        }

        let feed = ledger.subscribe().await.map_err(WaveError::read)?;
        let task = tokio::spawn(listen(
            feed,
            self.store.clone(),
            self.notices.clone(),
            generation,
        ));
        *active = Some(Active { generation, task });
        info!("listening for new waves on {} (session {generation})", ledger.contract_address());
        Ok(())
    }

    /// Returns whether a listener was attached.
    pub async fn detach(&self) -> bool {
        match self.active.lock().await.take() {
            Some(previous) => {
                previous.task.abort();
                debug!("detached event listener for session {}", previous.generation);
                true
            }
            None => false,
        }
    }

    /// Detaches only the listener belonging to `generation`.
    pub async fn detach_if(&self, generation: u64) -> bool {
        let mut active = self.active.lock().await;
        if active.as_ref().map(|current| current.generation) != Some(generation) {
            return false;
        }
        match active.take() {
            Some(previous) => {
                previous.task.abort();
                debug!("detached event listener for session {generation}");
                true
            }
            None => false,
        }
    }

    /// False once detached or once the ledger closed the stream.
    pub async fn is_active(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    pub async fn generation(&self) -> Option<u64> {
        self.active.lock().await.as_ref().map(|active| active.generation)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.task.abort();
        }
    }
}

async fn listen(mut feed: EntryFeed, store: StoreHandle, notices: NoticeBoard, generation: u64) {
    while let Some(record) = feed.recv().await {
        let Some(entry) = Entry::from_wire(record.clone()) else {
            warn!("ignoring malformed wave event {record:?}");
            continue;
        };
        let sender = entry.sender.clone();
        if store.insert_if_absent(entry).await {
            debug!("new wave from {sender}");
        } else {
            debug!("wave from {sender} already known");
        }
    }
    // Only reached when the ledger closes the feed; an abort never gets here.
    warn!("event stream for session {generation} ended");
    notices
        .raise(
            NoticeKind::ReadFailed,
            "live wave updates stopped; reconnect to resume",
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::eventually;
    use anyhow::Result;
    use std::sync::Arc;
    use wp_ledger_client::InMemoryLedger;
    use wp_types::WireEntry;

    fn wire(sender: &str, timestamp: i64, message: &str) -> WireEntry {
        WireEntry {
            waver: sender.to_owned(),
            timestamp,
            message: message.to_owned(),
        }
    }

    #[tokio::test]
    async fn notifications_append_once_and_leave_count_alone() -> Result<()> {
        let ledger = InMemoryLedger::new("0xcontract");
        let store = StoreHandle::default();
        store
            .prime(vec![Entry::from_wire(wire("A", 100, "hi")).expect("valid")], 1)
            .await;

        let subscription = EventSubscription::new(store.clone(), NoticeBoard::default());
        subscription.activate(&ledger, 1).await?;

        ledger.push_event(wire("A", 100, "hi"));
        ledger.push_event(wire("B", 200, "yo"));
        ledger.push_event(wire("B", 200, "yo"));

        eventually!(store.len().await == 2);
        let snapshot = store.snapshot().await;
        let senders: Vec<_> = snapshot.entries.iter().map(|e| e.sender.0.as_str()).collect();
        assert_eq!(senders, vec!["A", "B"]);
        assert_eq!(snapshot.total_count, Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn reactivation_replaces_previous_listener() -> Result<()> {
        let ledger = InMemoryLedger::new("0xcontract");
        let subscription = EventSubscription::new(StoreHandle::default(), NoticeBoard::default());

        subscription.activate(&ledger, 1).await?;
        subscription.activate(&ledger, 2).await?;

        eventually!(ledger.subscriber_count() == 1);
        assert_eq!(subscription.generation().await, Some(2));
        assert!(subscription.is_active().await);
        Ok(())
    }

    #[tokio::test]
    async fn detach_if_leaves_newer_listener_alone() -> Result<()> {
        let ledger = InMemoryLedger::new("0xcontract");
        let subscription = EventSubscription::new(StoreHandle::default(), NoticeBoard::default());

        subscription.activate(&ledger, 2).await?;
        assert!(!subscription.detach_if(1).await);
        assert!(subscription.is_active().await);
        assert_eq!(subscription.generation().await, Some(2));

        assert!(subscription.detach_if(2).await);
        assert!(!subscription.is_active().await);
        Ok(())
    }

    #[tokio::test]
    async fn detach_and_drop_release_the_feed() -> Result<()> {
        let ledger = InMemoryLedger::new("0xcontract");
        let store = StoreHandle::default();
        let notices = NoticeBoard::default();
        let subscription = EventSubscription::new(store.clone(), notices.clone());

        subscription.activate(&ledger, 1).await?;
        assert!(subscription.detach().await);
        assert!(!subscription.detach().await);
        assert!(!subscription.is_active().await);
        eventually!(ledger.subscriber_count() == 0);

        ledger.record_wave("B", "yo");
        tokio::task::yield_now().await;
        assert_eq!(store.len().await, 0);

        subscription.activate(&ledger, 2).await?;
        drop(subscription);
        eventually!(ledger.subscriber_count() == 0);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(notices.list().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn refused_subscription_is_a_read_failure() {
        let ledger = InMemoryLedger::new("0xcontract");
        ledger.set_fail_subscribe(true);
        let subscription = EventSubscription::new(StoreHandle::default(), NoticeBoard::default());

        let err = subscription.activate(&ledger, 1).await.expect_err("refused");
        assert!(matches!(err, WaveError::ReadFailure(_)));
        assert!(!subscription.is_active().await);
    }

    #[tokio::test]
    async fn closed_stream_raises_notice_and_goes_inactive() -> Result<()> {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        let notices = NoticeBoard::default();
        let subscription = EventSubscription::new(StoreHandle::default(), notices.clone());
        subscription.activate(ledger.as_ref(), 1).await?;
        assert!(subscription.is_active().await);

        drop(ledger);
        eventually!(!subscription.is_active().await);
        let raised = notices.list().await;
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].kind, NoticeKind::ReadFailed);
        Ok(())
    }
}
