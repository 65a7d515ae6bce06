//! Repository port trait.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory) implement this trait.

use crate::domain::{
    ApiKey, ApiKeyId, CompanyId, MomoTransaction, MomoTransactionId, NewMomoTransaction,
    NewWebhookRecord, Notification, NotificationId, NotificationStatus, Provider, ProviderConfig,
    ReconcileOutcome, StatusUpdate, WebhookFilter, WebhookId, WebhookRecord,
};
use crate::error::RepoError;

/// The main repository port for the reconciliation flow.
///
/// `apply_status_update` MUST be atomic: the transaction row, the idempotency
/// ledger and the notification outbox change together or not at all.
#[async_trait::async_trait]
pub trait MomoRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Webhook audit log
    // ─────────────────────────────────────────────────────────────────────────────

    /// Stores a freshly received callback in `pending` state.
    async fn record_webhook(&self, new: NewWebhookRecord) -> Result<WebhookRecord, RepoError>;

    async fn get_webhook(&self, id: WebhookId) -> Result<Option<WebhookRecord>, RepoError>;

    async fn list_webhooks(&self, filter: WebhookFilter) -> Result<Vec<WebhookRecord>, RepoError>;

    /// Marks the record `processed`, linking the matched transaction.
    async fn mark_webhook_processed(
        &self,
        id: WebhookId,
        transaction_id: Option<MomoTransactionId>,
    ) -> Result<(), RepoError>;

    /// Marks the record `failed` with a reason.
    async fn mark_webhook_failed(&self, id: WebhookId, error: &str) -> Result<(), RepoError>;

    /// Bumps `retry_count` and returns the updated record.
    async fn increment_webhook_retry(&self, id: WebhookId) -> Result<WebhookRecord, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────────

    async fn create_transaction(
        &self,
        new: NewMomoTransaction,
    ) -> Result<MomoTransaction, RepoError>;

    async fn get_transaction(
        &self,
        id: MomoTransactionId,
    ) -> Result<Option<MomoTransaction>, RepoError>;

    /// Finds by the provider's own transaction id. `company_id` narrows the
    /// search to one tenant when known.
    async fn find_by_provider_transaction_id(
        &self,
        company_id: Option<CompanyId>,
        provider: Provider,
        provider_transaction_id: &str,
    ) -> Result<Option<MomoTransaction>, RepoError>;

    /// Finds by the locally generated transaction number.
    async fn find_by_transaction_number(
        &self,
        company_id: Option<CompanyId>,
        transaction_number: &str,
    ) -> Result<Option<MomoTransaction>, RepoError>;

    /// Applies a webhook status to a transaction at most once.
    async fn apply_status_update(
        &self,
        update: StatusUpdate,
    ) -> Result<ReconcileOutcome, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Provider configuration
    // ─────────────────────────────────────────────────────────────────────────────

    async fn get_provider_config(
        &self,
        company_id: CompanyId,
        provider: Provider,
    ) -> Result<Option<ProviderConfig>, RepoError>;

    async fn upsert_provider_config(
        &self,
        config: ProviderConfig,
    ) -> Result<ProviderConfig, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Notification outbox
    // ─────────────────────────────────────────────────────────────────────────────

    async fn get_pending_notifications(&self, limit: i64)
    -> Result<Vec<Notification>, RepoError>;

    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
        last_error: Option<String>,
    ) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns the active key with this hash and records its use.
    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError>;

    /// Creates a key, returning the stored record and the raw key.
    async fn create_api_key(&self, name: &str) -> Result<(ApiKey, String), RepoError>;

    async fn count_api_keys(&self) -> Result<i64, RepoError>;

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError>;

    /// Deactivates a key. Returns `false` when no active key had this id.
    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError>;
}
