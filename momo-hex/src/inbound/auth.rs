//! Authentication middleware for API key validation.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use momo_types::{ApiKeyId, MomoRepository};

use super::handlers::AppState;

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
pub(crate) fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?.trim();
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// Key accepted by [`auth_middleware`], attached to the request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AuthenticatedKey(pub ApiKeyId);

/// `POST /webhooks/momo/{provider}`. The `retry` and `status` routes below it
/// are operator routes.
pub(crate) fn is_provider_callback(method: &Method, path: &str) -> bool {
    method == Method::POST
        && path
            .strip_prefix("/webhooks/momo/")
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// Routes reachable without an API key. Provider callbacks carry their own
/// signature.
fn is_public(method: &Method, path: &str) -> bool {
    match path {
        "/health" => true,
        "/api/bootstrap" => method == Method::POST,
        _ if path.starts_with("/swagger-ui") || path.starts_with("/api-docs") => true,
        _ => is_provider_callback(method, path),
    }
}

/// Authentication middleware that validates API keys.
///
/// This middleware:
/// 1. Extracts the API key from the Authorization header
/// 2. Hashes it using SHA-256
/// 3. Verifies the hash against the database
/// 4. Returns 401 Unauthorized if validation fails
/// 5. Otherwise records the key as [`AuthenticatedKey`] for the rate limiter
pub async fn auth_middleware<R: MomoRepository>(
    State(state): State<Arc<AppState<R>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key,
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    let key_hash = momo_repo::security::hash_api_key(api_key);

    match state.service.repo().verify_api_key_hash(&key_hash).await {
        Ok(Some(api_key)) => {
            tracing::debug!(key_id = %api_key.id, "api key accepted");
            request.extensions_mut().insert(AuthenticatedKey(api_key.id));
            next.run(request).await
        }
        Ok(None) => unauthorized_response("Invalid API key"),
        Err(e) => {
            tracing::error!("API key verification failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error",
                    "code": 500
                })),
            )
                .into_response()
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": 401
        })),
    )
        .into_response()
}
