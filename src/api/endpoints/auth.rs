//! Session endpoints.
//!
//! - `POST /api/auth/session`: the trusted identity front end opens a
//!   session for a signed-in user (bearer `IDENTITY_API_KEY`)
//! - `POST /api/auth/refresh`: rotate the pair using the refresh cookie
//! - `GET /api/auth/me`: current caller
//! - `POST /api/auth/logout`: revoke and clear cookies

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, SessionContext};
use crate::audit::AuditEntry;
use crate::cookies::SecureCookieManager;
use crate::models::{AuditEvent, AuditOutcome, Permission, Role};
use crate::session::{HealthcareSession, IssuedSession};

const SESSION_RESOURCE: &str = "/api/auth/session";
const REFRESH_RESOURCE: &str = "/api/auth/refresh";

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub user_id: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub expires_at: DateTime<Utc>,
    pub remember_me: bool,
}

impl From<&HealthcareSession> for SessionResponse {
    fn from(s: &HealthcareSession) -> Self {
        Self {
            user_id: s.user_id.clone(),
            role: s.role,
            permissions: s.permissions.clone(),
            expires_at: s.expires_at,
            remember_me: s.remember_me,
        }
    }
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// Constant-time check of the identity front end's bearer key.
fn identity_key_matches(ctx: &ApiContext, headers: &HeaderMap) -> bool {
    let Some(expected) = ctx.core.config.identity_api_key.as_ref() else {
        tracing::warn!("IDENTITY_API_KEY not configured; session creation disabled");
        return false;
    };
    let presented = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

fn with_session_cookies(ctx: &ApiContext, status: StatusCode, issued: &IssuedSession) -> Response {
    let mut response = (status, Json(SessionResponse::from(&issued.session))).into_response();
    SecureCookieManager::apply(response.headers_mut(), ctx.core.cookies.session_cookies(issued));
    response
}

/// `POST /api/auth/session`
pub async fn create_session(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateSessionRequest>,
) -> Result<Response, ApiError> {
    if !identity_key_matches(&ctx, &headers) {
        ctx.core.log(
            AuditEntry::new(AuditEvent::AuthFailure, AuditOutcome::Denied, SESSION_RESOURCE)
                .detail("identity key rejected"),
        );
        return Err(ApiError::Unauthorized);
    }

    let issued = ctx
        .core
        .write_sessions()?
        .create(&req.user_id, req.role, req.remember_me)?;

    tracing::info!(user_id = %issued.session.user_id, role = %req.role, "Session opened");
    ctx.core.log(
        AuditEntry::new(AuditEvent::Login, AuditOutcome::Success, SESSION_RESOURCE)
            .user(&issued.session.user_id)
            .detail(format!("role:{} remember_me:{}", req.role, req.remember_me)),
    );

    Ok(with_session_cookies(&ctx, StatusCode::CREATED, &issued))
}

/// `POST /api/auth/refresh`
pub async fn refresh(State(ctx): State<ApiContext>, headers: HeaderMap) -> Result<Response, ApiError> {
    let cookies = SecureCookieManager::read(&headers);
    let Some(token) = cookies.refresh_token else {
        return Err(ApiError::Unauthorized);
    };

    let result = ctx.core.write_sessions()?.refresh(&token);
    match result {
        Ok(issued) => {
            ctx.core.log(
                AuditEntry::new(AuditEvent::SessionRefreshed, AuditOutcome::Success, REFRESH_RESOURCE)
                    .user(&issued.session.user_id),
            );
            Ok(with_session_cookies(&ctx, StatusCode::OK, &issued))
        }
        Err(err) => {
            ctx.core.log(
                AuditEntry::new(AuditEvent::AuthFailure, AuditOutcome::Denied, REFRESH_RESOURCE)
                    .detail(err.to_string()),
            );
            let mut response = ApiError::from(err).into_response();
            SecureCookieManager::apply(response.headers_mut(), ctx.core.cookies.clear_cookies());
            Ok(response)
        }
    }
}

/// `GET /api/auth/me`
pub async fn me(Extension(session): Extension<SessionContext>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: session.user_id,
        role: session.role,
        permissions: session.permissions,
    })
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
) -> Result<Response, ApiError> {
    ctx.core.write_sessions()?.revoke(&session.session_id);
    ctx.core.log(
        AuditEntry::new(AuditEvent::Logout, AuditOutcome::Success, "/api/auth/logout")
            .user(&session.user_id),
    );

    let mut response = StatusCode::NO_CONTENT.into_response();
    SecureCookieManager::apply(response.headers_mut(), ctx.core.cookies.clear_cookies());
    Ok(response)
}
