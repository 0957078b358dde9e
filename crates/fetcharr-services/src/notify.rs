//! Request lifecycle notifications.
//!
//! Every state transition emits exactly one event. The trait is the seam;
//! [`LogNotifier`] is the default sink.

use async_trait::async_trait;
use uuid::Uuid;

use fetcharr_core::models::{MediaKind, MediaTier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// A request was submitted and is waiting for a reviewer.
    RequestPending,
    /// A reviewer approved the request.
    RequestApproved,
    /// The gate approved the request without a reviewer.
    RequestAutoApproved,
    /// An auto-generated request (watchlist import) was accepted.
    RequestAutoSubmitted,
    RequestDeclined,
    /// Dispatch gave up on the request.
    RequestFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event: NotificationEvent,
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub kind: MediaKind,
    pub tier: MediaTier,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Sink that writes notifications to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            request_id = %notification.request_id,
            user_id = %notification.user_id,
            kind = %notification.kind,
            tier = %notification.tier,
            event = ?notification.event,
            "Request notification"
        );
    }
}
