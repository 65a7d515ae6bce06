//! Mobile-money providers and their per-tenant configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::CompanyId;
use crate::error::DomainError;

/// Supported mobile-money providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Mtn,
    Airtel,
    Zamtel,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Mtn, Provider::Airtel, Provider::Zamtel];

    /// Code used in URLs and in the database.
    pub fn code(&self) -> &'static str {
        match self {
            Provider::Mtn => "mtn",
            Provider::Airtel => "airtel",
            Provider::Zamtel => "zamtel",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Provider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mtn" => Ok(Provider::Mtn),
            "airtel" => Ok(Provider::Airtel),
            "zamtel" => Ok(Provider::Zamtel),
            _ => Err(DomainError::UnknownProvider(s.to_string())),
        }
    }
}

/// Webhook settings for one provider within one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub company_id: CompanyId,
    pub provider: Provider,
    pub webhook_secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderConfig {
    pub fn new(company_id: CompanyId, provider: Provider, webhook_secret: String) -> Self {
        let now = Utc::now();
        Self {
            company_id,
            provider,
            webhook_secret,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// The secret to verify signatures with, or `None` when the configuration
    /// cannot be used. Callers must treat `None` as a verification failure.
    pub fn active_secret(&self) -> Option<&str> {
        if self.is_active && !self.webhook_secret.is_empty() {
            Some(&self.webhook_secret)
        } else {
            None
        }
    }
}
