//! Shared database row types.
//!
//! Both backends decode the same rows: UUIDs, timestamps and JSON columns use
//! sqlx's native encodings (BLOB/TEXT/TEXT on SQLite, UUID/TIMESTAMPTZ/JSONB on
//! PostgreSQL).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use momo_types::{
    ApiKey, ApiKeyId, CompanyId, Currency, MomoTransaction, MomoTransactionId, Money, Notification,
    NotificationId, NotificationStatus, Provider, ProviderConfig, RepoError, TransactionStatus,
    WebhookId, WebhookRecord, WebhookStatus,
};

// ─────────────────────────────────────────────────────────────────────────────
// Column lists
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! transaction_columns {
    () => {
        "id, company_id, provider, provider_transaction_id, transaction_number, amount, currency, \
         phone_number, status, provider_status, failure_reason, metadata, version, created_at, \
         updated_at, completed_at"
    };
}

macro_rules! webhook_columns {
    () => {
        "id, provider, company_id, event_type, payload, headers, source_ip, status, error_message, \
         retry_count, received_at, processed_at, transaction_id"
    };
}

macro_rules! provider_config_columns {
    () => {
        "company_id, provider, webhook_secret, is_active, created_at, updated_at"
    };
}

macro_rules! api_key_columns {
    () => {
        "id, name, key_hash, company_id, is_active, created_at, last_used_at"
    };
}

macro_rules! notification_columns {
    () => {
        "id, transaction_id, event_type, payload, status, attempts, last_error, created_at, \
         delivered_at"
    };
}

pub(crate) use {
    api_key_columns, notification_columns, provider_config_columns, transaction_columns,
    webhook_columns,
};

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Transaction row from database.
#[derive(FromRow)]
pub struct DbTransaction {
    pub id: Uuid,
    pub company_id: Uuid,
    pub provider: String,
    pub provider_transaction_id: Option<String>,
    pub transaction_number: String,
    pub amount: i64,
    pub currency: String,
    pub phone_number: Option<String>,
    pub status: String,
    pub provider_status: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: Json<serde_json::Value>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Webhook audit row from database.
#[derive(FromRow)]
pub struct DbWebhook {
    pub id: Uuid,
    pub provider: String,
    pub company_id: Option<Uuid>,
    pub event_type: String,
    pub payload: String,
    pub headers: Json<BTreeMap<String, String>>,
    pub source_ip: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<Uuid>,
}

/// Provider configuration row from database.
#[derive(FromRow)]
pub struct DbProviderConfig {
    pub company_id: Uuid,
    pub provider: String,
    pub webhook_secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API key row from database.
#[derive(FromRow)]
pub struct DbApiKey {
    pub id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub company_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Notification outbox row from database.
#[derive(FromRow)]
pub struct DbNotification {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub event_type: String,
    pub payload: Json<serde_json::Value>,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn parse_provider(s: &str) -> Result<Provider, RepoError> {
    s.parse::<Provider>()
        .map_err(|_| RepoError::Database(format!("Unknown provider: {}", s)))
}

pub fn parse_currency(s: &str) -> Result<Currency, RepoError> {
    s.parse::<Currency>()
        .map_err(|_| RepoError::Database(format!("Unknown currency: {}", s)))
}

pub fn parse_transaction_status(s: &str) -> Result<TransactionStatus, RepoError> {
    s.parse::<TransactionStatus>()
        .map_err(|_| RepoError::Database(format!("Unknown transaction status: {}", s)))
}

pub fn parse_webhook_status(s: &str) -> Result<WebhookStatus, RepoError> {
    s.parse::<WebhookStatus>()
        .map_err(|_| RepoError::Database(format!("Unknown webhook status: {}", s)))
}

pub fn parse_notification_status(s: &str) -> NotificationStatus {
    match s {
        "DELIVERED" => NotificationStatus::Delivered,
        "FAILED" => NotificationStatus::Failed,
        _ => NotificationStatus::Pending,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain conversion
// ─────────────────────────────────────────────────────────────────────────────

impl DbTransaction {
    /// Convert database row to domain MomoTransaction.
    pub fn into_domain(self) -> Result<MomoTransaction, RepoError> {
        let currency = parse_currency(&self.currency)?;
        let amount = Money::new(self.amount, currency).map_err(RepoError::Domain)?;

        Ok(MomoTransaction {
            id: MomoTransactionId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            provider: parse_provider(&self.provider)?,
            provider_transaction_id: self.provider_transaction_id,
            transaction_number: self.transaction_number,
            amount,
            phone_number: self.phone_number,
            status: parse_transaction_status(&self.status)?,
            provider_status: self.provider_status,
            failure_reason: self.failure_reason,
            metadata: self.metadata.0,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

impl DbWebhook {
    /// Convert database row to domain WebhookRecord.
    pub fn into_domain(self) -> Result<WebhookRecord, RepoError> {
        Ok(WebhookRecord {
            id: WebhookId::from_uuid(self.id),
            provider: self.provider,
            company_id: self.company_id.map(CompanyId::from_uuid),
            event_type: self.event_type,
            payload: self.payload,
            headers: self.headers.0,
            source_ip: self.source_ip,
            status: parse_webhook_status(&self.status)?,
            error_message: self.error_message,
            retry_count: self.retry_count,
            received_at: self.received_at,
            processed_at: self.processed_at,
            transaction_id: self.transaction_id.map(MomoTransactionId::from_uuid),
        })
    }
}

impl DbProviderConfig {
    pub fn into_domain(self) -> Result<ProviderConfig, RepoError> {
        Ok(ProviderConfig {
            company_id: CompanyId::from_uuid(self.company_id),
            provider: parse_provider(&self.provider)?,
            webhook_secret: self.webhook_secret,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl DbApiKey {
    pub fn into_domain(self) -> ApiKey {
        ApiKey {
            id: ApiKeyId::from_uuid(self.id),
            name: self.name,
            key_hash: self.key_hash,
            company_id: self.company_id.map(CompanyId::from_uuid),
            is_active: self.is_active,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }
}

impl DbNotification {
    pub fn into_domain(self) -> Notification {
        Notification {
            id: NotificationId::from_uuid(self.id),
            transaction_id: MomoTransactionId::from_uuid(self.transaction_id),
            event_type: self.event_type,
            payload: self.payload.0,
            status: parse_notification_status(&self.status),
            created_at: self.created_at,
            delivered_at: self.delivered_at,
            attempts: self.attempts,
            last_error: self.last_error,
        }
    }
}
