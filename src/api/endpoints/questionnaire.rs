//! Questionnaire endpoints.
//!
//! - `POST /api/questionnaire/next`: next question, completion or emergency
//! - `POST /api/questionnaire/options`: answer choices for a question
//! - `POST /api/questionnaire/suggestions`: completions for a typed answer

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::endpoints::require_permission;
use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, SessionContext};
use crate::audit::AuditEntry;
use crate::models::{
    AnswerOptions, AuditEvent, AuditOutcome, Permission, Question, QuestionResponse,
    QuestionStep, SymptomData,
};

#[derive(Deserialize)]
pub struct NextQuestionRequest {
    pub symptom_data: SymptomData,
    #[serde(default)]
    pub responses: Vec<QuestionResponse>,
}

#[derive(Deserialize)]
pub struct OptionsRequest {
    pub question: Question,
    pub symptom_data: SymptomData,
    #[serde(default)]
    pub responses: Vec<QuestionResponse>,
}

#[derive(Deserialize)]
pub struct SuggestionsRequest {
    pub question: Question,
    pub partial: String,
    pub symptom_data: SymptomData,
}

#[derive(Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
}

/// `POST /api/questionnaire/next`
pub async fn next(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    ApiJson(req): ApiJson<NextQuestionRequest>,
) -> Result<Json<QuestionStep>, ApiError> {
    require_permission(&ctx, &session, Permission::SubmitSymptoms, "/api/questionnaire/next")?;

    let step = ctx
        .core
        .questions
        .next_question(&req.symptom_data, &req.responses)
        .await?;

    if let QuestionStep::Emergency { check, .. } = &step {
        ctx.core.log(
            AuditEntry::new(
                AuditEvent::EmergencyDetected,
                AuditOutcome::Success,
                "/api/questionnaire/next",
            )
            .user(&session.user_id)
            .detail(format!("checked_by:{}", check.checked_by)),
        );
    }

    Ok(Json(step))
}

/// `POST /api/questionnaire/options`
pub async fn options(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    ApiJson(req): ApiJson<OptionsRequest>,
) -> Result<Json<AnswerOptions>, ApiError> {
    require_permission(&ctx, &session, Permission::SubmitSymptoms, "/api/questionnaire/options")?;

    let options = ctx
        .core
        .answers
        .options_for(&req.question, &req.symptom_data, &req.responses)
        .await?;
    Ok(Json(options))
}

/// `POST /api/questionnaire/suggestions`
pub async fn suggestions(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    ApiJson(req): ApiJson<SuggestionsRequest>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    require_permission(
        &ctx,
        &session,
        Permission::SubmitSymptoms,
        "/api/questionnaire/suggestions",
    )?;

    let suggestions = ctx
        .core
        .answers
        .suggestions(&req.question, &req.partial, &req.symptom_data)
        .await?;
    Ok(Json(SuggestionsResponse { suggestions }))
}
