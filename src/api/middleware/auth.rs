//! Cookie session authentication middleware.
//!
//! Reads the session cookie pair, validates the session id and, when the
//! access window has lapsed, silently rotates the pair through the refresh
//! cookie. Injects `SessionContext` for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::audit::AuditEntry;
use crate::cookies::{CookiePair, SecureCookieManager};
use crate::models::{AuditEvent, AuditOutcome};
use crate::session::{IssuedSession, SessionError};

/// Outcome of resolving the request's cookies to a session.
enum Resolved {
    Valid(SessionContext),
    Rotated(SessionContext, IssuedSession),
}

pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let path = req.uri().path().to_string();
    let cookies = SecureCookieManager::read(req.headers());

    let resolved = match resolve(&ctx, &cookies)? {
        Ok(r) => r,
        Err(failure) => {
            ctx.core.log(
                AuditEntry::new(AuditEvent::AuthFailure, AuditOutcome::Denied, &path)
                    .detail(failure.error.to_string()),
            );
            let clear = failure.cookies_to_clear(&ctx, &cookies);
            let mut response = ApiError::from(failure.error).into_response();
            SecureCookieManager::apply(response.headers_mut(), clear);
            return Ok(response);
        }
    };

    let (session, reissued) = match resolved {
        Resolved::Valid(session) => (session, None),
        Resolved::Rotated(session, issued) => {
            ctx.core.log(
                AuditEntry::new(AuditEvent::SessionRefreshed, AuditOutcome::Success, &path)
                    .user(&session.user_id),
            );
            let cookies = ctx.core.cookies.session_cookies(&issued);
            (session, Some(cookies))
        }
    };

    req.extensions_mut().insert(session);

    let mut response = next.run(req).await;

    if let Some(cookies) = reissued {
        SecureCookieManager::apply(response.headers_mut(), cookies);
    }
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));

    Ok(response)
}

/// Why a request could not be tied to a session.
struct Failure {
    error: SessionError,
    refresh_attempted: bool,
}

impl Failure {
    /// A failed refresh ends the pair. The refresh cookie only travels to
    /// `/api/auth`, so any other failure leaves it for `/api/auth/refresh`.
    fn cookies_to_clear(&self, ctx: &ApiContext, cookies: &CookiePair) -> Vec<HeaderValue> {
        if self.refresh_attempted {
            return ctx.core.cookies.clear_cookies();
        }
        match self.error {
            SessionError::Expired => Vec::new(),
            _ if cookies.session_id.is_some() => ctx.core.cookies.clear_session_cookie(),
            _ => Vec::new(),
        }
    }
}

/// Validate the session cookie, falling back to the refresh cookie when the
/// session is missing or its access window has closed.
fn resolve(ctx: &ApiContext, cookies: &CookiePair) -> Result<Result<Resolved, Failure>, ApiError> {
    let mut sessions = ctx.core.write_sessions()?;

    let error = match &cookies.session_id {
        Some(id) => match sessions.validate(id) {
            Ok(session) => return Ok(Ok(Resolved::Valid(SessionContext::from(&session)))),
            Err(e) => e,
        },
        None => SessionError::NotFound,
    };

    // Idle sessions are gone; only expiry or a missing id may fall back.
    let refresh = match &cookies.refresh_token {
        Some(token) if matches!(error, SessionError::Expired | SessionError::NotFound) => token,
        _ => {
            return Ok(Err(Failure {
                error,
                refresh_attempted: false,
            }))
        }
    };

    Ok(sessions
        .refresh(refresh)
        .map(|issued| {
            tracing::debug!(user_id = %issued.session.user_id, "Silent session refresh");
            Resolved::Rotated(SessionContext::from(&issued.session), issued)
        })
        .map_err(|error| Failure {
            error,
            refresh_attempted: true,
        }))
}
