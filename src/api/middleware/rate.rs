//! Per-caller rate limiting middleware.
//!
//! Sliding-window limits keyed by session cookie:
//! - 100 requests per minute
//! - 1000 requests per hour

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::cookies::SecureCookieManager;
use crate::session::hash_token;

/// Rate-limit key: a digest prefix of the session cookie, else a shared
/// anonymous bucket.
fn rate_key(req: &Request<axum::body::Body>) -> String {
    let cookies = SecureCookieManager::read(req.headers());
    match cookies.session_id.or(cookies.refresh_token) {
        Some(token) => {
            let digest = hash_token(&token);
            let prefix: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
            format!("session:{prefix}")
        }
        None => "anonymous".to_string(),
    }
}

/// Returns 429 if the caller exceeded its window.
pub async fn limit(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(req: Request<axum::body::Body>, next: Next) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = rate_key(&req);

    // MutexGuard is !Send; drop before .await
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        limiter.check(&key).map_err(|retry_after| {
            tracing::warn!(key = %key, retry_after, "Rate limit exceeded");
            ApiError::RateLimited { retry_after }
        })?;
    }

    Ok(next.run(req).await)
}
