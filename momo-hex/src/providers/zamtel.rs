//! Zamtel Kwacha callbacks.
//!
//! Zamtel reports `transactionId` (its own id), `thirdPartyReference` (ours)
//! and a `status` that is either a numeric result code (`0` = success) or a
//! word. Signatures are hex HMAC-SHA256, optionally prefixed with `sha256=`.

use momo_repo::security::verify_hex_signature;
use momo_types::{
    MomoProvider, ProcessingError, Provider, TransactionStatus, WebhookData, WebhookProcessor,
    WebhookVerifier,
};

use super::{generic_status, parse_json, text};

pub struct ZamtelProvider;

fn map_status(raw: &str) -> Option<TransactionStatus> {
    let trimmed = raw.trim();
    if let Ok(code) = trimmed.parse::<i64>() {
        return Some(if code == 0 {
            TransactionStatus::Successful
        } else {
            TransactionStatus::Failed
        });
    }
    match trimmed.to_ascii_uppercase().as_str() {
        "SUCCESS" => Some(TransactionStatus::Successful),
        "FAIL" => Some(TransactionStatus::Failed),
        _ => generic_status(trimmed),
    }
}

impl WebhookVerifier for ZamtelProvider {
    fn verify_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        let signature = signature.trim();
        let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
        verify_hex_signature(payload, signature, secret)
    }
}

impl WebhookProcessor for ZamtelProvider {
    fn process_webhook(&self, payload: &[u8]) -> Result<WebhookData, ProcessingError> {
        let value = parse_json(payload)?;

        let reference = text(&value, &["/thirdPartyReference"]);
        let transaction_id = text(&value, &["/transaction_id", "/transactionId"])
            .or_else(|| reference.clone())
            .ok_or(ProcessingError::MissingField("transaction id"))?;

        let provider_status = text(&value, &["/status", "/resultCode"])
            .ok_or(ProcessingError::MissingField("status"))?;
        let status = map_status(&provider_status)
            .ok_or_else(|| ProcessingError::UnknownStatus(provider_status.clone()))?;

        let reason = if status == TransactionStatus::Successful {
            None
        } else {
            text(&value, &["/message", "/resultDescription"])
        };

        Ok(WebhookData {
            transaction_id,
            reference,
            status,
            provider_status,
            event_id: text(&value, &["/event_id"]),
            amount: text(&value, &["/amount"]),
            currency: text(&value, &["/currency"]),
            reason,
            financial_transaction_id: text(&value, &["/transactionId"]),
        })
    }
}

impl MomoProvider for ZamtelProvider {
    fn provider(&self) -> Provider {
        Provider::Zamtel
    }
}
