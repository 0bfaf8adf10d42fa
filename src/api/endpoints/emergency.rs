//! `POST /api/emergency/check`: standalone emergency screen of free text.

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::endpoints::require_permission;
use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, SessionContext};
use crate::audit::AuditEntry;
use crate::models::{AuditEvent, AuditOutcome, EmergencyCheck, Permission};

const RESOURCE: &str = "/api/emergency/check";

#[derive(Deserialize)]
pub struct EmergencyCheckRequest {
    pub text: String,
    #[serde(default)]
    pub age: Option<u8>,
}

pub async fn check(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    ApiJson(req): ApiJson<EmergencyCheckRequest>,
) -> Result<Json<EmergencyCheck>, ApiError> {
    require_permission(&ctx, &session, Permission::SubmitSymptoms, RESOURCE)?;

    let result = ctx.core.analyzer.check_emergency(&req.text, req.age).await?;

    if result.is_emergency {
        ctx.core.log(
            AuditEntry::new(AuditEvent::EmergencyDetected, AuditOutcome::Success, RESOURCE)
                .user(&session.user_id)
                .detail(format!(
                    "checked_by:{} rules:{}",
                    result.checked_by,
                    result.matched_rules.join(",")
                )),
        );
    }

    Ok(Json(result))
}
