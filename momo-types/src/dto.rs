//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    CompanyId, Currency, MomoTransaction, MomoTransactionId, Provider, ProviderConfig,
    ReconcileOutcome, TransactionStatus, WebhookId, WebhookRecord, WebhookStatus,
};

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// `{success, message, data|error}` wrapper used by the operator webhook routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(message: Option<String>, data: T) -> Self {
        Self {
            success: true,
            message,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            error,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to record a newly initiated mobile-money transaction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    pub company_id: CompanyId,
    pub provider: Provider,
    /// Amount in smallest currency unit
    #[schema(example = 2500)]
    pub amount: i64,
    pub currency: Currency,
    /// Payer or payee MSISDN
    #[schema(example = "260971234567")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Local reference. Generated when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_number: Option<String>,
    /// Identifier returned by the provider when the payment was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_transaction_id: Option<String>,
}

/// Transaction as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: MomoTransactionId,
    pub company_id: CompanyId,
    pub provider: Provider,
    pub provider_transaction_id: Option<String>,
    #[schema(example = "MOMO-20240101-7K3QZ8WD")]
    pub transaction_number: String,
    #[schema(example = 2500)]
    pub amount: i64,
    pub currency: Currency,
    pub phone_number: Option<String>,
    pub status: TransactionStatus,
    pub provider_status: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&MomoTransaction> for TransactionResponse {
    fn from(tx: &MomoTransaction) -> Self {
        Self {
            id: tx.id,
            company_id: tx.company_id,
            provider: tx.provider,
            provider_transaction_id: tx.provider_transaction_id.clone(),
            transaction_number: tx.transaction_number.clone(),
            amount: tx.amount.amount(),
            currency: tx.amount.currency(),
            phone_number: tx.phone_number.clone(),
            status: tx.status,
            provider_status: tx.provider_status.clone(),
            failure_reason: tx.failure_reason.clone(),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
            completed_at: tx.completed_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider configuration DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to store a tenant's webhook secret for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderConfigRequest {
    pub company_id: CompanyId,
    #[schema(example = "whsec_4f1c...")]
    pub webhook_secret: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Stored configuration. The secret is never echoed back.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderConfigResponse {
    pub company_id: CompanyId,
    pub provider: Provider,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&ProviderConfig> for ProviderConfigResponse {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            company_id: config.company_id,
            provider: config.provider,
            is_active: config.is_active,
            updated_at: config.updated_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Audit record summary. Raw payload and headers are not exposed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookSummary {
    pub id: WebhookId,
    #[schema(example = "mtn")]
    pub provider: String,
    pub company_id: Option<CompanyId>,
    #[schema(example = "payment.callback")]
    pub event_type: String,
    pub status: WebhookStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub source_ip: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<MomoTransactionId>,
}

impl From<&WebhookRecord> for WebhookSummary {
    fn from(record: &WebhookRecord) -> Self {
        Self {
            id: record.id,
            provider: record.provider.clone(),
            company_id: record.company_id,
            event_type: record.event_type.clone(),
            status: record.status,
            error_message: record.error_message.clone(),
            retry_count: record.retry_count,
            source_ip: record.source_ip.clone(),
            received_at: record.received_at,
            processed_at: record.processed_at,
            transaction_id: record.transaction_id,
        }
    }
}

/// Payload of the webhook status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookStatusData {
    pub webhook: WebhookSummary,
    pub transaction: Option<TransactionResponse>,
}

/// Payload of a successful retry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetryData {
    pub webhook: WebhookSummary,
    pub outcome: ReconcileOutcome,
}

/// Query string of the webhook listing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WebhookListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WebhookStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}
