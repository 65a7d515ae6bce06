//! Domain models for the reconciliation service.

pub mod api_key;
pub mod ids;
pub mod money;
pub mod notification;
pub mod provider;
pub mod transaction;
pub mod webhook;

pub use api_key::ApiKey;
pub use ids::{ApiKeyId, CompanyId, MomoTransactionId, NotificationId, WebhookId};
pub use money::{Currency, Money};
pub use notification::{Notification, NotificationStatus};
pub use provider::{Provider, ProviderConfig};
pub use transaction::{
    MomoTransaction, NewMomoTransaction, ReconcileOutcome, StatusUpdate, TransactionStatus,
    Transition, WebhookData,
};
pub use webhook::{NewWebhookRecord, WebhookFilter, WebhookRecord, WebhookStatus};
