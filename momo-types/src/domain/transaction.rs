//! Mobile-money transaction domain model and the status reconciliation rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{CompanyId, MomoTransactionId, Money, Provider, WebhookId};
use crate::error::DomainError;

/// Lifecycle status of a mobile-money transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Successful,
    Failed,
    Cancelled,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Successful | Self::Failed | Self::Cancelled | Self::Expired
        )
    }

    /// Decides what moving from `self` to `to` means.
    ///
    /// A terminal status may only be "moved" to itself, which is a no-op.
    pub fn plan_transition(self, to: TransactionStatus) -> Result<Transition, DomainError> {
        if self == to {
            return Ok(Transition::Unchanged);
        }
        if self.is_terminal() {
            return Err(DomainError::InvalidTransition { from: self, to });
        }
        Ok(Transition::Apply)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "successful" => Ok(Self::Successful),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(DomainError::ValidationError(format!(
                "Unknown transaction status: {}",
                other
            ))),
        }
    }
}

/// Result of planning a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    Unchanged,
}

/// Normalised content of a provider callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookData {
    /// Identifier the provider used for the transaction. May be the provider's
    /// own id or the local transaction number echoed back.
    pub transaction_id: String,
    /// Local transaction number, when the provider echoes it separately.
    pub reference: Option<String>,
    pub status: TransactionStatus,
    /// Status string exactly as the provider sent it.
    pub provider_status: String,
    /// Provider event id, when the provider sends one.
    pub event_id: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub reason: Option<String>,
    /// Provider-side settlement reference.
    pub financial_transaction_id: Option<String>,
}

/// A request to apply a webhook's status to a matched transaction.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub webhook_id: WebhookId,
    pub transaction_id: MomoTransactionId,
    pub provider: Provider,
    pub data: WebhookData,
}

impl StatusUpdate {
    /// Key that makes applying the same provider event at-most-once.
    pub fn idempotency_key(&self) -> String {
        let event = self
            .data
            .event_id
            .as_deref()
            .unwrap_or(&self.data.transaction_id);
        format!("{}:{}:{}", self.provider, event, self.data.status)
    }
}

/// What the reconciler did with a [`StatusUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The transaction moved from one status to another.
    Applied {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    /// The transaction was already in the reported status.
    Unchanged { status: TransactionStatus },
    /// The same provider event was applied before.
    Duplicate,
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Input for recording a newly initiated transaction.
#[derive(Debug, Clone)]
pub struct NewMomoTransaction {
    pub company_id: CompanyId,
    pub provider: Provider,
    pub amount: Money,
    pub phone_number: Option<String>,
    pub transaction_number: String,
    pub provider_transaction_id: Option<String>,
}

/// A mobile-money collection or disbursement initiated by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomoTransaction {
    pub id: MomoTransactionId,
    pub company_id: CompanyId,
    pub provider: Provider,
    /// Identifier assigned by the provider.
    pub provider_transaction_id: Option<String>,
    /// Locally generated reference.
    pub transaction_number: String,
    pub amount: Money,
    pub phone_number: Option<String>,
    pub status: TransactionStatus,
    pub provider_status: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: serde_json::Value,
    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MomoTransaction {
    /// Creates a pending transaction.
    ///
    /// # Validation
    /// - Transaction number cannot be empty
    /// - Amount must be positive
    pub fn initiate(new: NewMomoTransaction) -> Result<Self, DomainError> {
        if new.transaction_number.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Transaction number cannot be empty".into(),
            ));
        }
        if new.amount.amount() == 0 {
            return Err(DomainError::ValidationError(
                "Amount must be positive".into(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: MomoTransactionId::new(),
            company_id: new.company_id,
            provider: new.provider,
            provider_transaction_id: new
                .provider_transaction_id
                .filter(|id| !id.trim().is_empty()),
            transaction_number: new.transaction_number,
            amount: new.amount,
            phone_number: new.phone_number,
            status: TransactionStatus::Pending,
            provider_status: None,
            failure_reason: None,
            metadata: serde_json::json!({}),
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    /// Applies a webhook status update in memory.
    ///
    /// Returns [`Transition::Unchanged`] without touching any field when the
    /// transaction is already in the reported status. On [`Transition::Apply`]
    /// the status, provider metadata and `version` are updated; persisting the
    /// result is the caller's job.
    pub fn apply_update(
        &mut self,
        update: &StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<Transition, DomainError> {
        let data = &update.data;
        let transition = self.status.plan_transition(data.status)?;
        if transition == Transition::Unchanged {
            return Ok(transition);
        }

        self.status = data.status;
        self.provider_status = Some(data.provider_status.clone());
        if matches!(
            data.status,
            TransactionStatus::Failed | TransactionStatus::Cancelled | TransactionStatus::Expired
        ) {
            self.failure_reason = data.reason.clone().or(self.failure_reason.take());
        }

        if self.provider_transaction_id.is_none() {
            self.provider_transaction_id = if data.transaction_id != self.transaction_number {
                Some(data.transaction_id.clone())
            } else {
                data.financial_transaction_id.clone()
            };
        }

        if !self.metadata.is_object() {
            self.metadata = serde_json::json!({});
        }
        if let Some(meta) = self.metadata.as_object_mut() {
            meta.insert(
                "last_webhook_id".into(),
                serde_json::Value::String(update.webhook_id.to_string()),
            );
            meta.insert(
                "provider_status".into(),
                serde_json::Value::String(data.provider_status.clone()),
            );
            let optional = [
                ("financial_transaction_id", &data.financial_transaction_id),
                ("reason", &data.reason),
                ("reported_amount", &data.amount),
                ("reported_currency", &data.currency),
            ];
            for (key, value) in optional {
                if let Some(value) = value {
                    meta.insert(key.into(), serde_json::Value::String(value.clone()));
                }
            }
        }

        if self.status.is_terminal() {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
        self.version += 1;

        Ok(Transition::Apply)
    }
}
