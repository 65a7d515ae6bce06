//! # MoMo Hex
//!
//! Application service layer, provider adapters and HTTP adapter for the
//! mobile-money webhook reconciliation service.
//!
//! ## Architecture
//!
//! - `service/` - Application service (the inbound webhook pipeline)
//! - `providers/` - MTN, Airtel and Zamtel signature and payload adapters
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service is generic over `R: MomoRepository`, allowing
//! different repository implementations to be injected.

pub mod inbound;
pub mod openapi;
pub mod providers;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use providers::ProviderRegistry;
pub use service::{InboundWebhook, PipelineError, Reconciled, RetryError, WebhookService};
