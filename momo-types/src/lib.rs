//! # MoMo Types
//!
//! Domain types and port traits for the mobile-money webhook reconciliation
//! service. This crate has ZERO external IO dependencies - only data
//! structures, business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Provider, Money, MomoTransaction, WebhookRecord)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types
//! - `signing/` - HMAC-SHA256 payload signatures

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;
pub mod signing;

// Re-export commonly used types
pub use domain::{
    ApiKey, ApiKeyId, CompanyId, Currency, MomoTransaction, MomoTransactionId, Money,
    NewMomoTransaction, NewWebhookRecord, Notification, NotificationId, NotificationStatus,
    Provider, ProviderConfig, ReconcileOutcome, StatusUpdate, TransactionStatus, Transition,
    WebhookData, WebhookFilter, WebhookId, WebhookRecord, WebhookStatus,
};
pub use dto::*;
pub use error::{AppError, DomainError, ProcessingError, RepoError};
pub use ports::{MomoProvider, MomoRepository, WebhookProcessor, WebhookVerifier};
