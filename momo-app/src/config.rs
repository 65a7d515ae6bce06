//! Configuration loading from environment.

use std::env;

use momo_types::CompanyId;

/// Application configuration.
#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Tenant for callbacks that carry no `company_id` query parameter.
    pub default_company_id: Option<CompanyId>,
    pub rate_limit_per_minute: u32,
    /// Downstream endpoint for status-change notifications. The delivery
    /// worker only runs when this is set.
    pub notification_url: Option<String>,
    pub notification_secret: Option<String>,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = var("PORT").unwrap_or_else(|| "3000".to_string()).parse()?;

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let default_company_id = var("DEFAULT_COMPANY_ID")
            .map(|raw| {
                raw.parse::<CompanyId>()
                    .map_err(|e| anyhow::anyhow!("DEFAULT_COMPANY_ID is not a UUID: {}", e))
            })
            .transpose()?;

        let rate_limit_per_minute = var("RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|| "100".to_string())
            .parse()?;

        Ok(Self {
            port,
            database_url,
            default_company_id,
            rate_limit_per_minute,
            notification_url: var("NOTIFICATION_URL"),
            notification_secret: var("NOTIFICATION_SECRET"),
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "sqlite::memory:")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.rate_limit_per_minute, 100);
        assert!(config.default_company_id.is_none());
        assert!(config.notification_url.is_none());
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_database_url_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DATABASE_URL", "  ")]).is_err());
    }

    #[test]
    fn test_full_configuration() {
        let config = load(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/momo"),
            ("DEFAULT_COMPANY_ID", "5f0c7a8e-1b2d-4c3e-9f4a-6b7c8d9e0f1a"),
            ("RATE_LIMIT_PER_MINUTE", "20"),
            ("NOTIFICATION_URL", "http://ledger.internal/events"),
            ("NOTIFICATION_SECRET", "n0tify"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit_per_minute, 20);
        assert_eq!(
            config.default_company_id.map(|c| c.to_string()).as_deref(),
            Some("5f0c7a8e-1b2d-4c3e-9f4a-6b7c8d9e0f1a")
        );
        assert_eq!(
            config.notification_url.as_deref(),
            Some("http://ledger.internal/events")
        );
        assert_eq!(config.notification_secret.as_deref(), Some("n0tify"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("DATABASE_URL", "x"), ("PORT", "http")]).is_err());
        assert!(load(&[("DATABASE_URL", "x"), ("DEFAULT_COMPANY_ID", "acme")]).is_err());
    }
}
