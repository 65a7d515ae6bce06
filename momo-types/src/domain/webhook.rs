//! Webhook audit records.
//!
//! Every inbound provider callback is stored before anything else happens
//! and is never deleted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{CompanyId, MomoTransactionId, WebhookId};
use crate::error::DomainError;

/// Header names checked for the provider signature, in order.
pub const SIGNATURE_HEADERS: [&str; 2] = ["x-signature", "signature"];

const DEFAULT_EVENT_TYPE: &str = "payment.callback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    #[default]
    Pending,
    Processed,
    Failed,
}

impl AsRef<str> for WebhookStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for WebhookStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown webhook status: {}",
                other
            ))),
        }
    }
}

/// Stored inbound callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub id: WebhookId,
    /// Provider code exactly as it appeared in the URL.
    pub provider: String,
    pub company_id: Option<CompanyId>,
    pub event_type: String,
    /// Raw request body.
    pub payload: String,
    /// Request headers, names lowercased.
    pub headers: BTreeMap<String, String>,
    pub source_ip: Option<String>,
    pub status: WebhookStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<MomoTransactionId>,
}

impl WebhookRecord {
    /// The signature header value, if one was sent.
    pub fn signature(&self) -> Option<&str> {
        SIGNATURE_HEADERS
            .iter()
            .filter_map(|name| self.headers.get(*name))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }

    pub fn is_processed(&self) -> bool {
        self.status == WebhookStatus::Processed
    }
}

/// Input for persisting a freshly received callback.
#[derive(Debug, Clone)]
pub struct NewWebhookRecord {
    pub provider: String,
    pub company_id: Option<CompanyId>,
    pub event_type: String,
    pub payload: String,
    pub headers: BTreeMap<String, String>,
    pub source_ip: Option<String>,
}

impl NewWebhookRecord {
    pub fn new(
        provider: impl Into<String>,
        company_id: Option<CompanyId>,
        payload: String,
        headers: BTreeMap<String, String>,
        source_ip: Option<String>,
    ) -> Self {
        let event_type = detect_event_type(&payload);
        Self {
            provider: provider.into(),
            company_id,
            event_type,
            payload,
            headers,
            source_ip,
        }
    }

    /// Builds the pending record that will be stored.
    pub fn into_record(self) -> WebhookRecord {
        WebhookRecord {
            id: WebhookId::new(),
            provider: self.provider,
            company_id: self.company_id,
            event_type: self.event_type,
            payload: self.payload,
            headers: self.headers,
            source_ip: self.source_ip,
            status: WebhookStatus::Pending,
            error_message: None,
            retry_count: 0,
            received_at: Utc::now(),
            processed_at: None,
            transaction_id: None,
        }
    }
}

/// Reads the event type from common payload keys, falling back to a generic
/// callback type. Never fails: the payload has not been validated yet.
pub fn detect_event_type(payload: &str) -> String {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| {
            ["event_type", "event", "type"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_owned))
        })
        .filter(|event| !event.is_empty())
        .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string())
}

/// Query over stored webhook records.
#[derive(Debug, Clone)]
pub struct WebhookFilter {
    pub status: Option<WebhookStatus>,
    pub provider: Option<String>,
    pub company_id: Option<CompanyId>,
    pub limit: i64,
}

impl Default for WebhookFilter {
    fn default() -> Self {
        Self {
            status: None,
            provider: None,
            company_id: None,
            limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_signature_prefers_x_signature() {
        let record = NewWebhookRecord::new(
            "mtn",
            None,
            "{}".into(),
            headers(&[("signature", "b"), ("x-signature", "a")]),
            None,
        )
        .into_record();
        assert_eq!(record.signature(), Some("a"));
    }

    #[test]
    fn test_signature_falls_back_and_ignores_blank() {
        let record = NewWebhookRecord::new(
            "mtn",
            None,
            "{}".into(),
            headers(&[("x-signature", "  "), ("signature", "b")]),
            None,
        )
        .into_record();
        assert_eq!(record.signature(), Some("b"));
    }

    #[test]
    fn test_missing_signature() {
        let record =
            NewWebhookRecord::new("mtn", None, "{}".into(), BTreeMap::new(), None).into_record();
        assert_eq!(record.signature(), None);
        assert_eq!(record.status, WebhookStatus::Pending);
        assert_eq!(record.retry_count, 0);
    }

    #[test]
    fn test_detect_event_type() {
        assert_eq!(
            detect_event_type(r#"{"event":"collection.completed"}"#),
            "collection.completed"
        );
        assert_eq!(detect_event_type("not json"), "payment.callback");
        assert_eq!(detect_event_type(r#"{"status":"SUCCESSFUL"}"#), "payment.callback");
    }
}
