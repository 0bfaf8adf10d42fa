//! API endpoint handlers.
//!
//! Handlers stay thin: validate the caller, delegate to the pipeline or
//! stores in `CoreState`, and record audit events for medical actions.

pub mod assessment;
pub mod audit;
pub mod auth;
pub mod consultations;
pub mod emergency;
pub mod health;
pub mod questionnaire;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::audit::AuditEntry;
use crate::models::{AuditEvent, AuditOutcome, Permission};

/// Reject with 403 and record `access_denied` when the caller lacks `permission`.
pub(crate) fn require_permission(
    ctx: &ApiContext,
    session: &SessionContext,
    permission: Permission,
    resource: &str,
) -> Result<(), ApiError> {
    if session.has_permission(permission) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %session.user_id,
        role = %session.role,
        permission = %permission,
        "Permission denied"
    );
    ctx.core.log(
        AuditEntry::new(AuditEvent::AccessDenied, AuditOutcome::Denied, resource)
            .user(&session.user_id)
            .detail(format!("missing permission {permission}")),
    );
    Err(ApiError::Forbidden)
}
