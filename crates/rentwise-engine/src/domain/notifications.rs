use crate::domain::types::{OrderId, UserId};
use crate::error::{RentalError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderConfirmed,
    OrderPickedUp,
    OrderReturned,
    OrderCancelled,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::OrderConfirmed => write!(f, "order_confirmed"),
            NotificationKind::OrderPickedUp => write!(f, "order_picked_up"),
            NotificationKind::OrderReturned => write!(f, "order_returned"),
            NotificationKind::OrderCancelled => write!(f, "order_cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub order_id: OrderId,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        order_id: OrderId,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            order_id,
        }
    }
}

/// Delivery channel for user-facing notifications.
///
/// Sinks are fire-and-forget from the lifecycle's point of view: an error is
/// logged by the caller and never undoes a committed transition.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            user_id = %notification.user_id,
            order_id = %notification.order_id,
            kind = %notification.kind,
            "{}: {}",
            notification.title,
            notification.message
        );
        Ok(())
    }
}

/// Hands notifications to a delivery worker through a bounded queue.
#[derive(Debug, Clone)]
pub struct QueuedNotificationSink {
    sender: mpsc::Sender<Notification>,
}

impl QueuedNotificationSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for QueuedNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.sender.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(n) => {
                RentalError::Notification(format!("queue full, dropped {} for {}", n.kind, n.user_id))
            }
            mpsc::error::TrySendError::Closed(n) => {
                RentalError::Notification(format!("queue closed, dropped {} for {}", n.kind, n.user_id))
            }
        })
    }
}
