//! MTN MoMo callbacks.
//!
//! MTN posts the request-to-pay result with `externalId` (our reference),
//! `financialTransactionId`, `status` and an optional `reason` object. The
//! reference id of the original request may be echoed as `referenceId`.
//! Signatures are hex HMAC-SHA256 of the raw body.

use momo_repo::security::verify_hex_signature;
use momo_types::{
    MomoProvider, ProcessingError, Provider, TransactionStatus, WebhookData, WebhookProcessor,
    WebhookVerifier,
};

use super::{generic_status, parse_json, text};

pub struct MtnProvider;

fn map_status(raw: &str) -> Option<TransactionStatus> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "SUCCESSFUL" => Some(TransactionStatus::Successful),
        "FAILED" | "REJECTED" => Some(TransactionStatus::Failed),
        "PENDING" => Some(TransactionStatus::Pending),
        "ONGOING" => Some(TransactionStatus::Processing),
        "TIMEOUT" | "EXPIRED" => Some(TransactionStatus::Expired),
        _ => generic_status(raw),
    }
}

impl WebhookVerifier for MtnProvider {
    fn verify_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        verify_hex_signature(payload, signature, secret)
    }
}

impl WebhookProcessor for MtnProvider {
    fn process_webhook(&self, payload: &[u8]) -> Result<WebhookData, ProcessingError> {
        let value = parse_json(payload)?;

        let reference = text(&value, &["/externalId"]);
        let transaction_id = text(
            &value,
            &["/transaction_id", "/referenceId", "/financialTransactionId"],
        )
        .or_else(|| reference.clone())
        .ok_or(ProcessingError::MissingField("transaction id"))?;

        let provider_status =
            text(&value, &["/status"]).ok_or(ProcessingError::MissingField("status"))?;
        let status = map_status(&provider_status)
            .ok_or_else(|| ProcessingError::UnknownStatus(provider_status.clone()))?;

        Ok(WebhookData {
            transaction_id,
            reference,
            status,
            provider_status,
            event_id: text(&value, &["/event_id", "/eventId"]),
            amount: text(&value, &["/amount"]),
            currency: text(&value, &["/currency"]),
            reason: text(&value, &["/reason/message", "/reason/code", "/reason"]),
            financial_transaction_id: text(&value, &["/financialTransactionId"]),
        })
    }
}

impl MomoProvider for MtnProvider {
    fn provider(&self) -> Provider {
        Provider::Mtn
    }
}
