use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use wp_types::{Notice, NoticeKind};

#[derive(Debug, Clone)]
struct Slot {
    notice: Notice,
    dismissed: bool,
}

/// User-visible notices in the order they were raised.
#[derive(Debug, Clone, Default)]
pub struct NoticeBoard {
    slots: Arc<RwLock<Vec<Slot>>>,
}

impl NoticeBoard {
    pub async fn raise(&self, kind: NoticeKind, message: impl Into<String>) -> Notice {
        let notice = Notice {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            raised_at: Utc::now(),
        };
        self.slots.write().await.push(Slot {
            notice: notice.clone(),
            dismissed: false,
        });
        notice
    }

    /// Undismissed notices, oldest first.
    pub async fn list(&self) -> Vec<Notice> {
        self.slots
            .read()
            .await
            .iter()
            .filter(|slot| !slot.dismissed)
            .map(|slot| slot.notice.clone())
            .collect()
    }

    /// Returns false when no notice has this id.
    pub async fn dismiss(&self, id: Uuid) -> bool {
        let mut slots = self.slots.write().await;
        match slots.iter_mut().find(|slot| slot.notice.id == id) {
            Some(slot) => {
                slot.dismissed = true;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dismiss_hides_notice_and_is_idempotent() {
        let board = NoticeBoard::default();
        let first = board.raise(NoticeKind::ReadFailed, "read failed").await;
        let second = board.raise(NoticeKind::SubmissionFailed, "submit failed").await;

        assert!(board.dismiss(first.id).await);
        assert!(board.dismiss(first.id).await);
        assert!(!board.dismiss(Uuid::new_v4()).await);

        let remaining = board.list().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
    }
}
