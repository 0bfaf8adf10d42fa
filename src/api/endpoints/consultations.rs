//! Consultation endpoints.
//!
//! - `POST /api/consultations`, `GET /api/consultations`
//! - `GET /api/consultations/:id`
//! - `POST /api/consultations/:id/messages`
//! - `POST /api/consultations/:id/status`
//! - `POST /api/consultations/:id/translate`

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::require_permission;
use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, SessionContext};
use crate::audit::AuditEntry;
use crate::consultation::{ConsultationError, Requester};
use crate::models::{
    AuditEvent, AuditOutcome, ConsultationMessage, ConsultationSession, ConsultationStatus,
    DoctorInfo, Permission, Role,
};
use crate::translation::TranslatedMessage;

#[derive(Deserialize)]
pub struct CreateConsultationRequest {
    pub doctor: DoctorInfo,
    /// Required when a doctor or admin opens the consultation.
    #[serde(default)]
    pub patient_id: Option<String>,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: ConsultationStatus,
}

#[derive(Deserialize)]
pub struct TranslateRequest {
    pub language: String,
}

#[derive(Serialize)]
pub struct TranslateResponse {
    pub consultation_id: Uuid,
    pub language: String,
    pub messages: Vec<TranslatedMessage>,
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid consultation id".into()))
}

fn requester(session: &SessionContext) -> Requester<'_> {
    Requester::new(&session.user_id, session.role)
}

/// Map a store error, recording participant checks that failed.
fn store_error(
    ctx: &ApiContext,
    session: &SessionContext,
    resource: &str,
    err: ConsultationError,
) -> ApiError {
    if err == ConsultationError::AccessDenied {
        ctx.core.log(
            AuditEntry::new(AuditEvent::AccessDenied, AuditOutcome::Denied, resource)
                .user(&session.user_id),
        );
    }
    ApiError::from(err)
}

/// `POST /api/consultations`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    ApiJson(req): ApiJson<CreateConsultationRequest>,
) -> Result<(StatusCode, Json<ConsultationSession>), ApiError> {
    require_permission(&ctx, &session, Permission::JoinConsultations, "/api/consultations")?;

    let patient_id = match session.role {
        Role::Patient => session.user_id.clone(),
        Role::Doctor | Role::Admin => {
            require_permission(
                &ctx,
                &session,
                Permission::ManageConsultations,
                "/api/consultations",
            )?;
            req.patient_id
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ApiError::Validation("patient_id is required".into()))?
        }
    };
    if req.doctor.id.trim().is_empty() || req.doctor.name.trim().is_empty() {
        return Err(ApiError::Validation("doctor id and name are required".into()));
    }
    if session.role == Role::Doctor && req.doctor.id != session.user_id {
        return Err(ApiError::Forbidden);
    }

    let created = ctx.core.write_consultations()?.create(&patient_id, req.doctor);
    ctx.core.log(
        AuditEntry::new(
            AuditEvent::ConsultationUpdated,
            AuditOutcome::Success,
            format!("/api/consultations/{}", created.id),
        )
        .user(&session.user_id)
        .detail("created"),
    );

    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/consultations`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<Vec<ConsultationSession>>, ApiError> {
    require_permission(&ctx, &session, Permission::JoinConsultations, "/api/consultations")?;
    let sessions = ctx.core.read_consultations()?.list_for_user(requester(&session));
    Ok(Json(sessions))
}

/// `GET /api/consultations/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
) -> Result<Json<ConsultationSession>, ApiError> {
    let resource = format!("/api/consultations/{id}");
    require_permission(&ctx, &session, Permission::JoinConsultations, &resource)?;
    let id = parse_id(&id)?;

    let found = ctx
        .core
        .read_consultations()?
        .get(id, requester(&session))
        .cloned();
    let consultation = found.map_err(|e| store_error(&ctx, &session, &resource, e))?;

    ctx.core.log(
        AuditEntry::new(AuditEvent::MedicalDataAccess, AuditOutcome::Success, &resource)
            .user(&session.user_id),
    );
    Ok(Json(consultation))
}

/// `POST /api/consultations/:id/messages`
pub async fn send_message(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<ConsultationMessage>), ApiError> {
    let resource = format!("/api/consultations/{id}/messages");
    require_permission(&ctx, &session, Permission::JoinConsultations, &resource)?;
    let id = parse_id(&id)?;

    let sent = ctx.core.write_consultations()?.add_message(
        id,
        requester(&session),
        &req.content,
        req.language.as_deref(),
    );
    let message = sent.map_err(|e| store_error(&ctx, &session, &resource, e))?;

    ctx.core.log(
        AuditEntry::new(AuditEvent::ConsultationUpdated, AuditOutcome::Success, &resource)
            .user(&session.user_id)
            .detail("message"),
    );
    Ok((StatusCode::CREATED, Json(message)))
}

/// `POST /api/consultations/:id/status`
pub async fn set_status(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> Result<Json<ConsultationSession>, ApiError> {
    let resource = format!("/api/consultations/{id}/status");
    require_permission(&ctx, &session, Permission::JoinConsultations, &resource)?;
    if req.status != ConsultationStatus::Cancelled {
        require_permission(&ctx, &session, Permission::ManageConsultations, &resource)?;
    }
    let id = parse_id(&id)?;

    let changed = ctx
        .core
        .write_consultations()?
        .set_status(id, requester(&session), req.status);
    let consultation = changed.map_err(|e| store_error(&ctx, &session, &resource, e))?;

    if consultation.status.is_terminal() {
        ctx.core.translator.clear_consultation(id);
    }
    ctx.core.log(
        AuditEntry::new(AuditEvent::ConsultationUpdated, AuditOutcome::Success, &resource)
            .user(&session.user_id)
            .detail(format!("status:{}", consultation.status)),
    );
    Ok(Json(consultation))
}

/// `POST /api/consultations/:id/translate`
pub async fn translate(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let resource = format!("/api/consultations/{id}/translate");
    require_permission(&ctx, &session, Permission::JoinConsultations, &resource)?;
    let id = parse_id(&id)?;

    // Snapshot under the read lock; the guard must not live across .await
    let found = ctx
        .core
        .read_consultations()?
        .get(id, requester(&session))
        .cloned();
    let consultation = found.map_err(|e| store_error(&ctx, &session, &resource, e))?;

    let messages = ctx
        .core
        .translator
        .translate_consultation(&consultation, &req.language)
        .await?;

    ctx.core.log(
        AuditEntry::new(AuditEvent::MedicalDataAccess, AuditOutcome::Success, &resource)
            .user(&session.user_id)
            .detail(format!("translated:{}", messages.len())),
    );
    Ok(Json(TranslateResponse {
        consultation_id: id,
        language: req.language.trim().to_ascii_lowercase(),
        messages,
    }))
}
