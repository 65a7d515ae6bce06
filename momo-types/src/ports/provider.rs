//! Provider capability ports.
//!
//! Each mobile-money network gets one implementation of both traits. Neither
//! performs IO: secrets are looked up by the caller and passed in.

use crate::domain::{Provider, WebhookData};
use crate::error::ProcessingError;

/// Authenticates that a payload was produced by the provider.
pub trait WebhookVerifier: Send + Sync {
    /// Returns `true` only if `signature` is valid for `payload` under `secret`.
    ///
    /// An empty secret or signature must return `false`.
    fn verify_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool;
}

/// Parses a provider callback body.
pub trait WebhookProcessor: Send + Sync {
    fn process_webhook(&self, payload: &[u8]) -> Result<WebhookData, ProcessingError>;
}

/// A provider integration: verifier plus processor.
pub trait MomoProvider: WebhookVerifier + WebhookProcessor {
    fn provider(&self) -> Provider;
}
