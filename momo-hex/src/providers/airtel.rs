//! Airtel Money callbacks.
//!
//! Airtel wraps the result in a `transaction` object: `id` is the reference we
//! sent, `airtel_money_id` is Airtel's own id, `status_code` is one of
//! `TS` (success), `TF` (failed), `TA` (ambiguous), `TIP` (in progress) or
//! `TE` (expired). Signatures are base64 HMAC-SHA256; hex is accepted too.

use momo_repo::security::{verify_base64_signature, verify_hex_signature};
use momo_types::{
    MomoProvider, ProcessingError, Provider, TransactionStatus, WebhookData, WebhookProcessor,
    WebhookVerifier,
};

use super::{generic_status, parse_json, text};

pub struct AirtelProvider;

fn map_status(raw: &str) -> Option<TransactionStatus> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "TS" => Some(TransactionStatus::Successful),
        "TF" => Some(TransactionStatus::Failed),
        "TA" | "TIP" => Some(TransactionStatus::Processing),
        "TE" => Some(TransactionStatus::Expired),
        _ => generic_status(raw),
    }
}

impl WebhookVerifier for AirtelProvider {
    fn verify_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        verify_base64_signature(payload, signature, secret)
            || verify_hex_signature(payload, signature, secret)
    }
}

impl WebhookProcessor for AirtelProvider {
    fn process_webhook(&self, payload: &[u8]) -> Result<WebhookData, ProcessingError> {
        let value = parse_json(payload)?;

        let reference = text(&value, &["/transaction/id"]);
        let financial_transaction_id = text(&value, &["/transaction/airtel_money_id"]);
        let transaction_id = text(&value, &["/transaction_id"])
            .or_else(|| financial_transaction_id.clone())
            .or_else(|| reference.clone())
            .ok_or(ProcessingError::MissingField("transaction id"))?;

        let provider_status = text(&value, &["/transaction/status_code", "/status"])
            .ok_or(ProcessingError::MissingField("status"))?;
        let status = map_status(&provider_status)
            .ok_or_else(|| ProcessingError::UnknownStatus(provider_status.clone()))?;

        let message = text(&value, &["/transaction/message", "/message"]);
        let reason = match status {
            TransactionStatus::Failed | TransactionStatus::Cancelled | TransactionStatus::Expired => {
                message
            }
            _ => None,
        };

        Ok(WebhookData {
            transaction_id,
            reference,
            status,
            provider_status,
            event_id: text(&value, &["/event_id"]),
            amount: text(&value, &["/transaction/amount", "/amount"]),
            currency: text(&value, &["/transaction/currency", "/currency"]),
            reason,
            financial_transaction_id,
        })
    }
}

impl MomoProvider for AirtelProvider {
    fn provider(&self) -> Provider {
        Provider::Airtel
    }
}
