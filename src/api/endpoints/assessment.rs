//! `POST /api/assessment`: final severity assessment for a questionnaire.

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::endpoints::require_permission;
use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, SessionContext};
use crate::audit::AuditEntry;
use crate::models::{
    AssessmentResult, AuditEvent, AuditOutcome, Permission, QuestionResponse, SymptomData,
};

const RESOURCE: &str = "/api/assessment";

#[derive(Deserialize)]
pub struct AssessmentRequest {
    pub symptom_data: SymptomData,
    #[serde(default)]
    pub responses: Vec<QuestionResponse>,
}

pub async fn assess(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    ApiJson(req): ApiJson<AssessmentRequest>,
) -> Result<Json<AssessmentResult>, ApiError> {
    require_permission(&ctx, &session, Permission::SubmitSymptoms, RESOURCE)?;

    let result = ctx
        .core
        .analyzer
        .assess(&req.symptom_data, &req.responses)
        .await?;

    if result.is_emergency {
        ctx.core.log(
            AuditEntry::new(AuditEvent::EmergencyDetected, AuditOutcome::Success, RESOURCE)
                .user(&session.user_id)
                .detail(format!("source:{}", result.source)),
        );
    }
    ctx.core.log(
        AuditEntry::new(AuditEvent::AssessmentGenerated, AuditOutcome::Success, RESOURCE)
            .user(&session.user_id)
            .detail(format!("severity:{} source:{}", result.severity, result.source)),
    );

    Ok(Json(result))
}
