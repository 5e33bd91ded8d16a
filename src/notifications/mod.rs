use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;

/// Events pushed to guests/staff after a transaction commits. Delivery
/// mechanics (push/email/WhatsApp) live behind the dispatcher collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    ReservationConfirmed {
        reservation_id: Uuid,
        client_id: Uuid,
    },
    CheckInCompleted {
        reservation_id: Uuid,
        room_id: Uuid,
    },
    CheckOutCompleted {
        reservation_id: Uuid,
        points_credited: i64,
    },
    ReservationCancelled {
        reservation_id: Uuid,
        penalty: Decimal,
        refund: Decimal,
    },
    ManualRefundRequired {
        reservation_id: Uuid,
        amount: Decimal,
        reason: String,
    },
    NoShowRecorded {
        reservation_id: Uuid,
        retained: Decimal,
    },
    RewardRedeemed {
        redemption_id: Uuid,
        reward_id: Uuid,
        client_id: Uuid,
        points_spent: i64,
    },
}

/// Fire-and-forget notification collaborator. Implementations must never
/// block or fail the transaction that triggered the event.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<()>;
}

/// Dispatcher that emits events as structured log lines. Used where no
/// delivery channel is wired and as the default in tests.
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        let payload = serde_json::to_string(event).unwrap_or_default();
        tracing::info!(target: "notifications", event = %payload, "notification dispatched");
        Ok(())
    }
}

/// Dispatches an event, logging failures instead of propagating them.
/// Called strictly after the owning transaction has committed.
pub async fn dispatch_best_effort(dispatcher: &dyn NotificationDispatcher, event: NotificationEvent) {
    if let Err(e) = dispatcher.notify(&event).await {
        tracing::warn!(error = %e, event = ?event, "notification dispatch failed");
        crate::observability::metrics::record_notification_failure();
    }
}
