//! Provider adapters.
//!
//! One module per mobile-money network. Each adapter implements
//! [`MomoProvider`]: signature verification plus payload normalisation into
//! [`WebhookData`](momo_types::WebhookData). The registry maps a parsed
//! [`Provider`] to its adapter.

mod airtel;
mod mtn;
mod zamtel;

use std::collections::HashMap;
use std::sync::Arc;

use momo_types::{MomoProvider, ProcessingError, Provider, TransactionStatus};
use serde_json::Value;

pub use airtel::AirtelProvider;
pub use mtn::MtnProvider;
pub use zamtel::ZamtelProvider;

/// Lookup table of provider adapters.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn MomoProvider>>,
}

impl Default for ProviderRegistry {
    /// Registers every supported network.
    fn default() -> Self {
        Self::empty()
            .with(Arc::new(MtnProvider))
            .with(Arc::new(AirtelProvider))
            .with(Arc::new(ZamtelProvider))
    }
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registers (or replaces) the adapter for `provider.provider()`.
    pub fn with(mut self, provider: Arc<dyn MomoProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn MomoProvider>> {
        self.providers.get(&provider).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload helpers shared by the adapters
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn parse_json(payload: &[u8]) -> Result<Value, ProcessingError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| ProcessingError::MalformedPayload(e.to_string()))?;
    if !value.is_object() {
        return Err(ProcessingError::MalformedPayload(
            "expected a JSON object".into(),
        ));
    }
    Ok(value)
}

/// First non-empty value among JSON pointers, with numbers rendered as text.
pub(crate) fn text(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| {
        let found = match value.pointer(pointer)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!found.is_empty()).then_some(found)
    })
}

/// Status names every provider may send in the generic payload shape.
pub(crate) fn generic_status(raw: &str) -> Option<TransactionStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" | "initiated" => Some(TransactionStatus::Pending),
        "processing" | "in_progress" | "ongoing" => Some(TransactionStatus::Processing),
        "successful" | "success" | "completed" | "succeeded" => {
            Some(TransactionStatus::Successful)
        }
        "failed" | "failure" | "rejected" | "declined" => Some(TransactionStatus::Failed),
        "cancelled" | "canceled" => Some(TransactionStatus::Cancelled),
        "expired" | "timeout" | "timed_out" => Some(TransactionStatus::Expired),
        _ => None,
    }
}
