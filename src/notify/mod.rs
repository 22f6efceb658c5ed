//! Outbound notification boundary.
//!
//! Every state or membership change fans out best-effort notifications.
//! Delivery is fire-and-forget: a failure is logged by the implementation
//! and never rolls back the mutation that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

/// What happened, from the target user's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    NewMember,
    JoinRequestAccepted,
    JoinRequestRejected,
    MemberKicked,
    TutorUpdated,
    OwnerUpdated,
    ClassroomStarted,
    ClassroomFinished,
    ClassroomTerminated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub origin_user: String,
    pub target_user: String,
    pub classroom_id: String,
    pub content: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn emit(&self, notification: Notification);
}

/// Notifier that only records to the log stream
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn emit(&self, notification: Notification) {
        tracing::info!(
            kind = ?notification.kind,
            target_user = %notification.target_user,
            classroom_id = %notification.classroom_id,
            "Notification emitted"
        );
    }
}

/// Non-blocking queue in front of a delivery backend.
///
/// `emit` returns immediately; a background task forwards notifications to
/// the wrapped sink and logs (does not propagate) delivery problems.
pub struct NotificationQueue {
    sender: mpsc::UnboundedSender<Notification>,
}

impl NotificationQueue {
    pub fn new(sink: Arc<dyn Notifier>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(Self::process(sink, receiver));

        Self { sender }
    }

    async fn process(sink: Arc<dyn Notifier>, mut receiver: mpsc::UnboundedReceiver<Notification>) {
        tracing::info!("Notification processor started");
        while let Some(notification) = receiver.recv().await {
            sink.emit(notification).await;
        }
        tracing::info!("Notification processor stopped");
    }
}

#[async_trait]
impl Notifier for NotificationQueue {
    async fn emit(&self, notification: Notification) {
        if let Err(e) = self.sender.send(notification) {
            tracing::error!(error = %e, "Failed to queue notification");
        }
    }
}

/// Test notifier capturing everything emitted
pub struct MemoryNotifier {
    emitted: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            emitted: Mutex::new(Vec::new()),
        })
    }

    pub async fn emitted(&self) -> Vec<Notification> {
        self.emitted.lock().await.clone()
    }

    pub async fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.emitted
            .lock()
            .await
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn emit(&self, notification: Notification) {
        self.emitted.lock().await.push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: NotificationKind, target: &str) -> Notification {
        Notification {
            kind,
            origin_user: "u1".into(),
            target_user: target.into(),
            classroom_id: "c1".into(),
            content: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_memory_notifier_captures() {
        let notifier = MemoryNotifier::new();
        notifier.emit(sample(NotificationKind::NewMember, "u2")).await;
        notifier
            .emit(sample(NotificationKind::ClassroomStarted, "u3"))
            .await;

        assert_eq!(notifier.emitted().await.len(), 2);
        let started = notifier.of_kind(NotificationKind::ClassroomStarted).await;
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].target_user, "u3");
    }

    #[tokio::test]
    async fn test_queue_forwards_to_sink() {
        let sink = MemoryNotifier::new();
        let queue = NotificationQueue::new(sink.clone());

        queue.emit(sample(NotificationKind::MemberKicked, "u2")).await;

        // Let the background forwarder run
        tokio::task::yield_now().await;
        for _ in 0..50 {
            if !sink.emitted().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        let emitted = sink.emitted().await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].kind, NotificationKind::MemberKicked);
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&NotificationKind::JoinRequestAccepted).unwrap();
        assert_eq!(json, "\"JOIN_REQUEST_ACCEPTED\"");
    }
}
