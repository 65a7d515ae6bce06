//! # MoMo Client SDK
//!
//! A typed Rust client for the reconciliation API, plus a helper that posts
//! signed provider callbacks the way a provider would.

use momo_types::{
    ApiEnvelope, CompanyId, CreateTransactionRequest, MomoTransactionId, Provider,
    ProviderConfigRequest, ProviderConfigResponse, RetryData, TransactionResponse, WebhookId,
    WebhookListQuery, WebhookStatusData, WebhookSummary,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

pub use momo_types::signing::sign_payload;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Plain-text answer to a provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    pub status: u16,
    pub body: String,
}

impl CallbackResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Reconciliation API client.
pub struct MomoClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl MomoClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http: Client::new(),
        }
    }

    /// Sets the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates the first API key. Only works on a fresh deployment.
    pub async fn bootstrap(&self, name: &str) -> Result<String, ClientError> {
        let resp: serde_json::Value = self
            .post("/api/bootstrap", &serde_json::json!({ "name": name }))
            .await?;
        api_key_field(resp)
    }

    pub async fn create_api_key(&self, name: &str) -> Result<String, ClientError> {
        let resp: serde_json::Value = self
            .post("/api/keys", &serde_json::json!({ "name": name }))
            .await?;
        api_key_field(resp)
    }

    pub async fn list_api_keys(&self) -> Result<Vec<serde_json::Value>, ClientError> {
        self.get("/api/keys").await
    }

    pub async fn delete_api_key(&self, id: &str) -> Result<(), ClientError> {
        let req = self
            .authorize(self.http.delete(format!("{}/api/keys/{}", self.base_url, id)));
        let resp = req.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(api_error(resp).await)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transactions and provider configuration
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records a transaction initiated with a provider.
    pub async fn create_transaction(
        &self,
        req: &CreateTransactionRequest,
    ) -> Result<TransactionResponse, ClientError> {
        self.post("/api/momo/transactions", req).await
    }

    pub async fn get_transaction(
        &self,
        id: MomoTransactionId,
    ) -> Result<TransactionResponse, ClientError> {
        self.get(&format!("/api/momo/transactions/{}", id)).await
    }

    /// Stores the webhook secret a company shares with a provider.
    pub async fn configure_provider(
        &self,
        provider: Provider,
        req: &ProviderConfigRequest,
    ) -> Result<ProviderConfigResponse, ClientError> {
        let url = format!("{}/api/momo/providers/{}/config", self.base_url, provider);
        let resp = self.authorize(self.http.put(url).json(req)).send().await?;
        handle_response(resp).await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Webhooks
    // ─────────────────────────────────────────────────────────────────────────────

    /// Posts a provider callback. Signs it when a secret is given.
    pub async fn send_callback(
        &self,
        provider: &str,
        company_id: Option<CompanyId>,
        payload: &str,
        secret: Option<&str>,
    ) -> Result<CallbackResponse, ClientError> {
        let mut req = self
            .http
            .post(format!("{}/webhooks/momo/{}", self.base_url, provider))
            .header("Content-Type", "application/json")
            .body(payload.to_string());
        if let Some(company_id) = company_id {
            req = req.query(&[("company_id", company_id.to_string())]);
        }
        if let Some(secret) = secret {
            req = req.header("X-Signature", sign_payload(payload.as_bytes(), secret));
        }

        let resp = req.send().await?;
        Ok(CallbackResponse {
            status: resp.status().as_u16(),
            body: resp.text().await?,
        })
    }

    pub async fn list_webhooks(
        &self,
        query: &WebhookListQuery,
    ) -> Result<Vec<WebhookSummary>, ClientError> {
        let req = self
            .authorize(self.http.get(format!("{}/api/momo/webhooks", self.base_url)))
            .query(query);
        handle_response(req.send().await?).await
    }

    /// Reprocesses a stored callback.
    pub async fn retry_webhook(&self, id: WebhookId) -> Result<RetryData, ClientError> {
        let req = self.authorize(
            self.http
                .post(format!("{}/webhooks/momo/{}/retry", self.base_url, id)),
        );
        let envelope: ApiEnvelope<RetryData> = handle_response(req.send().await?).await?;
        envelope_data(envelope)
    }

    pub async fn webhook_status(&self, id: WebhookId) -> Result<WebhookStatusData, ClientError> {
        let envelope: ApiEnvelope<WebhookStatusData> =
            self.get(&format!("/webhooks/momo/{}/status", id)).await?;
        envelope_data(envelope)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let req = self.authorize(self.http.get(format!("{}{}", self.base_url, path)));
        let resp = req.send().await?;
        handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let req = self.authorize(
            self.http
                .post(format!("{}{}", self.base_url, path))
                .json(body),
        );
        let resp = req.send().await?;
        handle_response(resp).await
    }
}

fn api_key_field(resp: serde_json::Value) -> Result<String, ClientError> {
    resp.get("api_key")
        .and_then(|k| k.as_str())
        .map(String::from)
        .ok_or_else(|| ClientError::Api {
            status: 200,
            message: "response has no api_key".into(),
        })
}

fn envelope_data<T>(envelope: ApiEnvelope<T>) -> Result<T, ClientError> {
    match envelope.data {
        Some(data) if envelope.success => Ok(data),
        _ => Err(ClientError::Api {
            status: 200,
            message: envelope
                .error
                .or(envelope.message)
                .unwrap_or_else(|| "empty response".into()),
        }),
    }
}

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    if resp.status().is_success() {
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    } else {
        Err(api_error(resp).await)
    }
}

async fn api_error(resp: reqwest::Response) -> ClientError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ClientError::Api {
        status,
        message: error_message(&body),
    }
}

/// `error` of `{error, code}` bodies, `error` or `message` of envelopes,
/// otherwise the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["error", "message"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|e| e.as_str()).map(String::from))
        })
        .unwrap_or_else(|| body.to_string())
}
