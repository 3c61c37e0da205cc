use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};
use wp_ledger_client::LedgerContract;
use wp_types::{TxHash, TxStatus, WalletAddress};
use wp_wallet::WalletProvider;

use crate::bootstrap::{BootstrapOutcome, bootstrap};
use crate::connection::{Connection, Session};
use crate::error::{WaveBlocked, WaveError};
use crate::notices::NoticeBoard;
use crate::store::StoreHandle;
use crate::subscription::EventSubscription;
use crate::transaction::{TransactionLifecycle, WaveContext};

#[derive(Debug, Clone, Default)]
pub struct PortalOptions {
    /// Forwarded with every submission.
    pub fee_hint: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveOutcome {
    pub status: TxStatus,
    pub tx_hash: Option<TxHash>,
    pub total_count: Option<u64>,
    pub error: Option<WaveError>,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The client session: one wallet, one ledger, one deduplicated view.
pub struct WavePortal {
    ledger: Arc<dyn LedgerContract>,
    connection: Connection,
    store: StoreHandle,
    subscription: EventSubscription,
    notices: NoticeBoard,
    draft: RwLock<String>,
    busy: AtomicBool,
    fee_hint: Option<u64>,
}

impl WavePortal {
    pub fn new(
        ledger: Arc<dyn LedgerContract>,
        wallet: Option<Arc<dyn WalletProvider>>,
        options: PortalOptions,
    ) -> Self {
        let notices = NoticeBoard::default();
        let store = StoreHandle::default();
        Self {
            ledger,
            connection: Connection::new(wallet, notices.clone()),
            subscription: EventSubscription::new(store.clone(), notices.clone()),
            store,
            notices,
            draft: RwLock::new(String::new()),
            busy: AtomicBool::new(false),
            fee_hint: options.fee_hint,
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub async fn account(&self) -> Option<WalletAddress> {
        self.connection.account().await
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn draft(&self) -> String {
        self.draft.read().await.clone()
    }

    pub async fn set_draft(&self, message: impl Into<String>) {
        *self.draft.write().await = message.into();
    }

    pub async fn subscription_active(&self) -> bool {
        self.subscription.is_active().await
    }

    /// Startup: adopt an already-authorized account and sync it.
    pub async fn load(&self) -> Option<Session> {
        let session = self.connection.check_silently().await?;
        self.sync_session(&session).await;
        Some(session)
    }

    /// Prompts the wallet, then syncs the new session.
    pub async fn connect(&self) -> Result<Session, WaveError> {
        let session = self.connection.connect().await?;
        self.sync_session(&session).await;
        Ok(session)
    }

    async fn sync_session(&self, session: &Session) {
        self.subscription.detach().await;

        match bootstrap(self.ledger.as_ref(), &self.store, &self.connection, session.generation).await {
            Ok(BootstrapOutcome::Applied { .. }) => {}
            Ok(BootstrapOutcome::Stale) => return,
            Err(err) => {
                self.report(&err).await;
                return;
            }
        }

        if let Err(err) = self
            .subscription
            .activate(self.ledger.as_ref(), session.generation)
            .await
        {
            self.report(&err).await;
            return;
        }

        if !self.connection.is_current(session.generation).await {
            info!("session {} superseded while subscribing", session.generation);
            self.subscription.detach_if(session.generation).await;
        }
    }

    /// Sends `message`, or the current draft when `None`. Returns
    /// `WaveBlocked` when the wave is not attempted at all. The draft is
    /// cleared after confirmation only if it still holds the sent text.
    pub async fn wave(&self, message: Option<String>) -> Result<WaveOutcome, WaveBlocked> {
        let Some(account) = self.connection.account().await else {
            return Err(WaveBlocked::NotConnected);
        };
        let Some(wallet) = self.connection.provider().cloned() else {
            return Err(WaveBlocked::NotConnected);
        };

        let message = match message {
            Some(message) => message,
            None => self.draft().await,
        };
        if message.trim().is_empty() {
            return Err(WaveBlocked::EmptyMessage);
        }

        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            return Err(WaveBlocked::Busy);
        };

        let ctx = WaveContext {
            ledger: self.ledger.as_ref(),
            wallet: wallet.as_ref(),
            store: &self.store,
            fee_hint: self.fee_hint,
        };
        let settlement = TransactionLifecycle::new().run(&ctx, &account, &message).await;

        if let Some(err) = &settlement.error {
            self.report(err).await;
        }
        if let Some(err) = &settlement.count_error {
            self.report(err).await;
        }
        if settlement.status == TxStatus::Confirmed {
            let mut draft = self.draft.write().await;
            if *draft == message {
                draft.clear();
            }
        }

        Ok(WaveOutcome {
            status: settlement.status,
            tx_hash: settlement.tx_hash,
            total_count: settlement.total_count,
            error: settlement.error,
        })
    }

    async fn report(&self, err: &WaveError) {
        warn!("{err}");
        self.notices.raise(err.notice_kind(), err.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedWallet, eventually};
    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use wp_ledger_client::{
        EntryFeed, InMemoryLedger, SubmitWaveReceipt, SubmitWaveRequest, TxOutcome,
    };
    use wp_types::{NoticeKind, WireEntry};

    /// Serves reads from an in-memory log but hands out feeds the node has
    /// already closed.
    struct ClosingFeedLedger(InMemoryLedger);

    #[async_trait]
    impl LedgerContract for ClosingFeedLedger {
        fn contract_address(&self) -> &str {
            self.0.contract_address()
        }

        async fn get_all_entries(&self) -> Result<Vec<WireEntry>> {
            self.0.get_all_entries().await
        }

        async fn get_total_count(&self) -> Result<u64> {
            self.0.get_total_count().await
        }

        async fn submit(&self, req: SubmitWaveRequest) -> Result<SubmitWaveReceipt> {
            self.0.submit(req).await
        }

        async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxOutcome> {
            self.0.wait_for_receipt(tx_hash).await
        }

        async fn subscribe(&self) -> Result<EntryFeed> {
            let (_, feed) = mpsc::unbounded_channel();
            Ok(feed)
        }
    }

    fn wire(sender: &str, timestamp: i64, message: &str) -> WireEntry {
        WireEntry {
            waver: sender.to_owned(),
            timestamp,
            message: message.to_owned(),
        }
    }

    fn portal(ledger: &Arc<InMemoryLedger>, wallet: Option<ScriptedWallet>) -> Arc<WavePortal> {
        let wallet = wallet.map(|wallet| Arc::new(wallet) as Arc<dyn WalletProvider>);
        Arc::new(WavePortal::new(
            ledger.clone(),
            wallet,
            PortalOptions {
                fee_hint: Some(300_000),
            },
        ))
    }

    fn senders(entries: &[wp_types::Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.sender.0.as_str()).collect()
    }

    #[tokio::test]
    async fn own_wave_already_notified_is_not_duplicated() -> Result<()> {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        ledger.seed(vec![wire("A", 100, "hi")]);
        ledger.set_clock(Some(200));
        let portal = portal(&ledger, Some(ScriptedWallet::authorized("B")));

        portal.load().await.expect("silent connect");
        let snapshot = portal.store().snapshot().await;
        assert_eq!(senders(&snapshot.entries), vec!["A"]);
        assert_eq!(snapshot.total_count, Some(1));

        ledger.push_event(wire("B", 200, "yo"));
        eventually!(portal.store().len().await == 2);
        assert_eq!(portal.store().total_count().await, Some(1));

        let outcome = portal.wave(Some("yo".to_owned())).await?;
        assert_eq!(outcome.status, TxStatus::Confirmed);
        assert_eq!(outcome.total_count, Some(2));

        tokio::task::yield_now().await;
        let snapshot = portal.store().snapshot().await;
        assert_eq!(senders(&snapshot.entries), vec!["A", "B"]);
        assert_eq!(snapshot.total_count, Some(2));
        assert_eq!(portal.draft().await, "");
        Ok(())
    }

    #[tokio::test]
    async fn missing_wallet_surfaces_notice_without_connecting() {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        let portal = portal(&ledger, None);

        assert_eq!(portal.connect().await, Err(WaveError::ProviderAbsent));
        assert_eq!(portal.account().await, None);
        let notices = portal.notices().list().await;
        assert_eq!(notices.last().map(|n| n.kind), Some(NoticeKind::WalletNotFound));
        assert_eq!(
            portal.wave(Some("hi".to_owned())).await,
            Err(WaveBlocked::NotConnected)
        );
    }

    #[tokio::test]
    async fn confirmation_error_preserves_draft_and_store() -> Result<()> {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        ledger.seed(vec![wire("A", 100, "hi")]);
        let portal = portal(&ledger, Some(ScriptedWallet::authorized("B")));
        portal.load().await.expect("silent connect");

        portal.set_draft("hello").await;
        ledger.set_fail_receipts(true);
        let outcome = portal.wave(None).await?;

        assert_eq!(outcome.status, TxStatus::Failed);
        assert!(matches!(outcome.error, Some(WaveError::ConfirmFailure(_))));
        assert_eq!(portal.draft().await, "hello");
        let snapshot = portal.store().snapshot().await;
        assert_eq!(snapshot.total_count, Some(1));
        assert!(!portal.is_busy());

        let notices = portal.notices().list().await;
        assert_eq!(notices.last().map(|n| n.kind), Some(NoticeKind::SubmissionFailed));
        Ok(())
    }

    #[tokio::test]
    async fn second_wave_is_blocked_while_first_is_pending() -> Result<()> {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        ledger.set_manual_mining(true);
        let portal = portal(&ledger, Some(ScriptedWallet::authorized("B")));
        portal.load().await.expect("silent connect");
        portal.set_draft("first").await;

        let pending = {
            let portal = portal.clone();
            tokio::spawn(async move { portal.wave(None).await })
        };
        eventually!(ledger.pending_count() == 1);
        assert!(portal.is_busy());
        assert_eq!(portal.wave(Some("second".to_owned())).await, Err(WaveBlocked::Busy));

        ledger.push_event(wire("C", 50, "meanwhile"));
        eventually!(portal.store().len().await == 1);

        ledger.mine_pending();
        let outcome = pending.await?.expect("attempted");
        assert_eq!(outcome.status, TxStatus::Confirmed);
        assert!(!portal.is_busy());
        eventually!(portal.store().len().await == 2);
        assert_eq!(portal.draft().await, "");
        Ok(())
    }

    #[tokio::test]
    async fn closed_feed_raises_read_notice() {
        let ledger = Arc::new(ClosingFeedLedger(InMemoryLedger::new("0xcontract")));
        ledger.0.seed(vec![wire("A", 100, "hi")]);
        let wallet: Arc<dyn WalletProvider> = Arc::new(ScriptedWallet::authorized("B"));
        let portal = WavePortal::new(ledger, Some(wallet), PortalOptions::default());

        portal.load().await.expect("silent connect");
        eventually!(!portal.subscription_active().await);

        let notices = portal.notices().list().await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::ReadFailed);
        assert_eq!(portal.store().len().await, 1);
    }

    #[tokio::test]
    async fn reconnect_does_not_report_replaced_feed() -> Result<()> {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        let portal = portal(&ledger, Some(ScriptedWallet::authorized("B")));
        portal.load().await.expect("silent connect");
        portal.connect().await?;

        eventually!(ledger.subscriber_count() == 1);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(portal.notices().list().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn explicit_message_leaves_typed_draft_alone() -> Result<()> {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        let portal = portal(&ledger, Some(ScriptedWallet::authorized("B")));
        portal.load().await.expect("silent connect");

        portal.set_draft("still typing").await;
        let outcome = portal.wave(Some("quick wave".to_owned())).await?;
        assert_eq!(outcome.status, TxStatus::Confirmed);
        assert_eq!(portal.draft().await, "still typing");

        ledger.set_fail_submits(true);
        let outcome = portal.wave(Some("another".to_owned())).await?;
        assert_eq!(outcome.status, TxStatus::Failed);
        assert_eq!(portal.draft().await, "still typing");
        Ok(())
    }

    #[tokio::test]
    async fn blank_message_is_not_attempted() {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        let portal = portal(&ledger, Some(ScriptedWallet::authorized("B")));
        portal.load().await.expect("silent connect");

        assert_eq!(portal.wave(None).await, Err(WaveBlocked::EmptyMessage));
        assert_eq!(
            portal.wave(Some("   ".to_owned())).await,
            Err(WaveBlocked::EmptyMessage)
        );
        assert_eq!(ledger.pending_count(), 0);
        assert!(ledger.entries().is_empty());
    }

    #[tokio::test]
    async fn explicit_connect_bootstraps_and_reconnect_keeps_one_listener() -> Result<()> {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        ledger.seed(vec![wire("A", 100, "hi")]);
        let portal = portal(&ledger, Some(ScriptedWallet::unauthorized(true)));

        assert!(portal.load().await.is_none());
        assert_eq!(portal.store().len().await, 0);

        portal.connect().await?;
        assert_eq!(portal.store().len().await, 1);
        portal.connect().await?;

        eventually!(ledger.subscriber_count() == 1);
        assert!(portal.subscription_active().await);

        ledger.record_wave("C", "again");
        eventually!(portal.store().len().await == 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_bootstrap_leaves_empty_store_and_no_listener() {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        ledger.seed(vec![wire("A", 100, "hi")]);
        ledger.set_fail_reads(true);
        let portal = portal(&ledger, Some(ScriptedWallet::authorized("B")));

        assert!(portal.load().await.is_some());
        let snapshot = portal.store().snapshot().await;
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.total_count, None);
        assert!(!portal.subscription_active().await);

        let notices = portal.notices().list().await;
        assert_eq!(notices.last().map(|n| n.kind), Some(NoticeKind::ReadFailed));
    }

    #[tokio::test]
    async fn confirmed_wave_without_listener_waits_for_next_bootstrap() -> Result<()> {
        let ledger = Arc::new(InMemoryLedger::new("0xcontract"));
        ledger.set_fail_subscribe(true);
        let portal = portal(&ledger, Some(ScriptedWallet::authorized("B")));
        portal.load().await.expect("silent connect");
        assert!(!portal.subscription_active().await);

        let outcome = portal.wave(Some("hi".to_owned())).await?;
        assert_eq!(outcome.status, TxStatus::Confirmed);
        assert_eq!(portal.store().total_count().await, Some(1));
        assert_eq!(portal.store().len().await, 0);

        ledger.set_fail_subscribe(false);
        portal.connect().await?;
        assert_eq!(portal.store().len().await, 1);
        Ok(())
    }
}
