//! HTTP request handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use momo_types::{
    ApiEnvelope, ApiKeyId, AppError, CompanyId, CreateTransactionRequest, MomoRepository,
    MomoTransactionId, ProviderConfigRequest, ProviderConfigResponse, RetryData,
    TransactionResponse, WebhookId, WebhookListQuery, WebhookSummary,
};

use super::client_ip::SourceIp;
use crate::service::{InboundWebhook, PipelineError, RetryError};
use crate::WebhookService;

/// Application state shared across handlers.
pub struct AppState<R: MomoRepository> {
    pub service: WebhookService<R>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider callbacks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ReceiveParams {
    pub company_id: Option<String>,
}

/// Status code and plain-text body answered to the provider.
fn pipeline_status(err: &PipelineError) -> (StatusCode, &'static str) {
    match err {
        PipelineError::UnknownProvider(_) => (StatusCode::NOT_FOUND, "Unknown provider"),
        PipelineError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
        PipelineError::Processing(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Processing failed"),
        PipelineError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_ascii_lowercase(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Receive a provider callback.
///
/// Public: authenticated by the provider signature, not by API key. An
/// unparseable `company_id` is ignored, which makes verification fail closed
/// unless a default company is configured.
#[tracing::instrument(skip(state, params, headers, body), fields(provider = %provider))]
pub async fn receive_webhook<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(provider): Path<String>,
    Query(params): Query<ReceiveParams>,
    SourceIp(source_ip): SourceIp,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let company_id = params
        .company_id
        .as_deref()
        .and_then(|raw| raw.trim().parse::<CompanyId>().ok());

    let inbound = InboundWebhook {
        provider,
        company_id,
        payload: String::from_utf8_lossy(&body).into_owned(),
        headers: header_map(&headers),
        source_ip,
    };

    match state.service.receive(inbound).await {
        Ok(_) => (StatusCode::OK, "OK").into_response(),
        Err(err) => pipeline_status(&err).into_response(),
    }
}

/// Reprocess a stored callback that has not been processed yet.
#[tracing::instrument(skip(state), fields(webhook_id = %id))]
pub async fn retry_webhook<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(webhook_id) = id.parse::<WebhookId>() else {
        return not_found_envelope();
    };

    match state.service.retry(webhook_id).await {
        Ok((record, reconciled)) => {
            let data = RetryData {
                webhook: WebhookSummary::from(&record),
                outcome: reconciled.outcome,
            };
            let message = if reconciled.outcome.is_applied() {
                "Webhook reprocessed successfully"
            } else {
                "Webhook reprocessed, no status change"
            };
            (
                StatusCode::OK,
                Json(ApiEnvelope::ok(Some(message.into()), data)),
            )
                .into_response()
        }
        Err(RetryError::NotFound) => not_found_envelope(),
        Err(RetryError::AlreadyProcessed) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiEnvelope::<()>::fail("Webhook already processed", None)),
        )
            .into_response(),
        Err(RetryError::Failed(err)) => {
            let status = match err {
                PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (
                status,
                Json(ApiEnvelope::<()>::fail(
                    "Webhook retry failed",
                    Some(err.to_string()),
                )),
            )
                .into_response()
        }
        Err(RetryError::Internal(msg)) => {
            tracing::error!(error = %msg, "webhook retry failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiEnvelope::<()>::fail("Internal Server Error", None)),
            )
                .into_response()
        }
    }
}

/// Current state of a stored callback.
#[tracing::instrument(skip(state), fields(webhook_id = %id))]
pub async fn webhook_status<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Ok(webhook_id) = id.parse::<WebhookId>() else {
        return Ok(not_found_envelope());
    };

    match state.service.status(webhook_id).await {
        Ok(data) => Ok(Json(ApiEnvelope::ok(None, data)).into_response()),
        Err(AppError::NotFound(_)) => Ok(not_found_envelope()),
        Err(err) => Err(err.into()),
    }
}

fn not_found_envelope() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiEnvelope::<()>::fail("Webhook not found", None)),
    )
        .into_response()
}

/// List stored callbacks.
#[tracing::instrument(skip(state))]
pub async fn list_webhooks<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<WebhookListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.service.list_webhooks(query).await?;
    let response: Vec<WebhookSummary> = records.iter().map(WebhookSummary::from).collect();
    Ok(Json(response))
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions and provider configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Record a transaction initiated with a provider.
#[tracing::instrument(skip(state, req), fields(provider = %req.provider, amount = req.amount))]
pub async fn create_transaction<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state.service.create_transaction(req).await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&tx))))
}

/// Get transaction by ID.
#[tracing::instrument(skip(state), fields(transaction_id = %id))]
pub async fn get_transaction<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let transaction_id: MomoTransactionId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid transaction ID".into()))?;

    let tx = state.service.get_transaction(transaction_id).await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

/// Store a tenant's webhook secret for a provider.
#[tracing::instrument(skip(state, req), fields(provider = %provider))]
pub async fn upsert_provider_config<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(provider): Path<String>,
    Json(req): Json<ProviderConfigRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state.service.upsert_provider_config(&provider, req).await?;
    Ok(Json(ProviderConfigResponse::from(&config)))
}

// ─────────────────────────────────────────────────────────────────────────────
// API keys
// ─────────────────────────────────────────────────────────────────────────────

/// Bootstrap endpoint - creates the first API key.
///
/// This endpoint only works when there are NO existing API keys in the system.
/// It returns the raw API key (only shown once) that should be saved securely.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct BootstrapRequest {
    /// Name for the API key
    #[schema(example = "ops-console")]
    pub name: String,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct BootstrapResponse {
    /// The generated API key (shown only once)
    #[schema(example = "sk_abc123xyz...")]
    pub api_key: String,
    /// Informational message
    pub message: String,
}

#[tracing::instrument(skip(state), fields(key_name = %req.name))]
pub async fn bootstrap<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<BootstrapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key_count = state
        .service
        .repo()
        .count_api_keys()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if key_count > 0 {
        return Err(AppError::BadRequest(
            "Bootstrap not allowed: API keys already exist. Use an existing key to create new ones.".into()
        ).into());
    }

    let (_api_key, raw_key) = state
        .service
        .repo()
        .create_api_key(&req.name)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(BootstrapResponse {
            api_key: raw_key,
            message: "First API key created. Save this key securely - it won't be shown again!"
                .into(),
        }),
    ))
}

/// Request to create a new API key.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct CreateApiKeyRequest {
    /// Name for the API key
    #[schema(example = "reconciliation-worker")]
    pub name: String,
}

/// Response containing API key info (without the raw key).
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ApiKeyInfo {
    /// API key ID
    #[schema(value_type = String, example = "123e4567-e89b-12d3-a456-426614174000")]
    pub id: ApiKeyId,
    /// Name of the API key
    pub name: String,
    /// Whether the key is active
    pub is_active: bool,
    /// When the key was created (ISO 8601)
    #[schema(value_type = String, example = "2024-01-01T00:00:00Z")]
    pub created_at: String,
    /// When the key was last used (ISO 8601)
    #[schema(value_type = Option<String>)]
    pub last_used_at: Option<String>,
}

/// Create a new API key (requires authentication).
#[tracing::instrument(skip(state), fields(key_name = %req.name))]
pub async fn create_api_key<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("API key name cannot be empty".into()).into());
    }

    let (_api_key, raw_key) = state
        .service
        .repo()
        .create_api_key(&req.name)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(BootstrapResponse {
            api_key: raw_key,
            message: "API key created. Save this key securely - it won't be shown again!".into(),
        }),
    ))
}

/// List all active API keys (without exposing raw keys).
#[tracing::instrument(skip(state))]
pub async fn list_api_keys<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let keys = state
        .service
        .repo()
        .list_api_keys()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let response: Vec<ApiKeyInfo> = keys
        .into_iter()
        .map(|k| ApiKeyInfo {
            id: k.id,
            name: k.name,
            is_active: k.is_active,
            created_at: k.created_at.to_rfc3339(),
            last_used_at: k.last_used_at.map(|dt| dt.to_rfc3339()),
        })
        .collect();

    Ok(Json(response))
}

/// Delete (deactivate) an API key.
#[tracing::instrument(skip(state), fields(key_id = %id))]
pub async fn delete_api_key<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ApiKeyId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid API key ID".into()))?;

    let deleted = state
        .service
        .repo()
        .delete_api_key(key_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(AppError::NotFound("API key not found".into()).into())
    }
}
