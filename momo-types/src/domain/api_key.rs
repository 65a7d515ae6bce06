//! API Key domain type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiKeyId, CompanyId};

/// An API key for authenticating operator requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub name: String,
    pub key_hash: String,
    pub company_id: Option<CompanyId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Creates a new API key with the given name and hash.
    pub fn new(name: String, key_hash: String, company_id: Option<CompanyId>) -> Self {
        Self {
            id: ApiKeyId::new(),
            name,
            key_hash,
            company_id,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}
