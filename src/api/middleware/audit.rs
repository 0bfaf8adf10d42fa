//! Request audit middleware.
//!
//! Records every protected API call with user id, method, path and
//! response status. Runs innermost, after auth has injected
//! `SessionContext`.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::{ApiContext, SessionContext};
use crate::audit::AuditEntry;
use crate::models::{AuditEvent, AuditOutcome};

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let ctx = req.extensions().get::<ApiContext>().cloned();
    let user_id = req
        .extensions()
        .get::<SessionContext>()
        .map(|s| s.user_id.clone());

    let response = next.run(req).await;

    if let Some(ctx) = ctx {
        let status = response.status();
        let outcome = if status.is_success() || status.is_redirection() {
            AuditOutcome::Success
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            AuditOutcome::Denied
        } else {
            AuditOutcome::Failure
        };

        let mut entry = AuditEntry::new(AuditEvent::ApiAccess, outcome, format!("{method} {path}"))
            .detail(format!("status:{}", status.as_u16()));
        if let Some(user_id) = user_id {
            entry = entry.user(user_id);
        }
        ctx.core.log(entry);
    }

    response
}
