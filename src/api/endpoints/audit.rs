//! `GET /api/audit/recent`: newest audit entries, admins only.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::endpoints::require_permission;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::audit::AuditEntry;
use crate::models::Permission;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct RecentResponse {
    pub entries: Vec<AuditEntry>,
}

pub async fn recent(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<RecentResponse>, ApiError> {
    require_permission(&ctx, &session, Permission::ViewAuditLog, "/api/audit/recent")?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = ctx.core.audit().recent(limit)?;
    Ok(Json(RecentResponse { entries }))
}
