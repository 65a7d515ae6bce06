//! Outbound notifications produced by status changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MomoTransaction, MomoTransactionId, NotificationId, TransactionStatus, WebhookId};

pub const STATUS_CHANGED_EVENT: &str = "transaction.status_changed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NotificationStatus {
    #[default]
    Pending,
    Delivered,
    Failed,
}

impl AsRef<str> for NotificationStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub transaction_id: MomoTransactionId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_error: Option<String>,
}

impl Notification {
    pub fn new(
        transaction_id: MomoTransactionId,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            transaction_id,
            event_type: event_type.into(),
            payload,
            status: NotificationStatus::Pending,
            created_at: Utc::now(),
            delivered_at: None,
            attempts: 0,
            last_error: None,
        }
    }

    /// Outbox entry for a transaction that just moved out of `from`.
    pub fn status_changed(
        tx: &MomoTransaction,
        from: TransactionStatus,
        webhook_id: WebhookId,
    ) -> Self {
        let payload = serde_json::json!({
            "event": STATUS_CHANGED_EVENT,
            "transaction_id": tx.id,
            "transaction_number": tx.transaction_number,
            "company_id": tx.company_id,
            "provider": tx.provider,
            "provider_transaction_id": tx.provider_transaction_id,
            "previous_status": from,
            "status": tx.status,
            "amount": tx.amount.amount(),
            "currency": tx.amount.currency(),
            "webhook_id": webhook_id,
            "occurred_at": tx.updated_at,
        });
        Self::new(tx.id, STATUS_CHANGED_EVENT, payload)
    }
}
