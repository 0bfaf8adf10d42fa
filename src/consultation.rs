//! In-memory doctor consultations.

use std::collections::HashMap;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ConsultationMessage, ConsultationSession, ConsultationStatus, DoctorInfo, MessageSender,
    Permission, Role,
};

pub const MAX_MESSAGE_CHARS: usize = 4_000;
const MAX_LANGUAGE_CODE_CHARS: usize = 8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsultationError {
    #[error("Consultation not found: {0}")]
    NotFound(Uuid),

    #[error("Not a participant in this consultation")]
    AccessDenied,

    #[error("Cannot change consultation from {from} to {to}")]
    InvalidTransition {
        from: ConsultationStatus,
        to: ConsultationStatus,
    },

    #[error("Consultation is {0}")]
    Closed(ConsultationStatus),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Identity of the user acting on a consultation.
#[derive(Debug, Clone, Copy)]
pub struct Requester<'a> {
    pub user_id: &'a str,
    pub role: Role,
}

impl<'a> Requester<'a> {
    pub fn new(user_id: &'a str, role: Role) -> Self {
        Self { user_id, role }
    }

    fn can_access(&self, session: &ConsultationSession) -> bool {
        self.role == Role::Admin || session.is_participant(self.user_id)
    }
}

#[derive(Default)]
pub struct ConsultationStore {
    sessions: HashMap<Uuid, ConsultationSession>,
}

impl ConsultationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, patient_id: &str, doctor: DoctorInfo) -> ConsultationSession {
        let now = Utc::now();
        let session = ConsultationSession {
            id: Uuid::new_v4(),
            patient_id: patient_id.to_string(),
            doctor,
            messages: Vec::new(),
            status: ConsultationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        tracing::info!(
            consultation_id = %session.id,
            doctor_id = %session.doctor.id,
            "Consultation created"
        );
        self.sessions.insert(session.id, session.clone());
        session
    }

    pub fn get(
        &self,
        id: Uuid,
        who: Requester<'_>,
    ) -> Result<&ConsultationSession, ConsultationError> {
        let session = self.sessions.get(&id).ok_or(ConsultationError::NotFound(id))?;
        if !who.can_access(session) {
            return Err(ConsultationError::AccessDenied);
        }
        Ok(session)
    }

    /// Consultations visible to the requester, most recently updated first.
    pub fn list_for_user(&self, who: Requester<'_>) -> Vec<ConsultationSession> {
        let mut out: Vec<ConsultationSession> = self
            .sessions
            .values()
            .filter(|s| who.can_access(s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    pub fn add_message(
        &mut self,
        id: Uuid,
        who: Requester<'_>,
        content: &str,
        language: Option<&str>,
    ) -> Result<ConsultationMessage, ConsultationError> {
        let content = content.trim();
        let chars = content.chars().count();
        if chars == 0 {
            return Err(ConsultationError::InvalidMessage("content must not be empty".into()));
        }
        if chars > MAX_MESSAGE_CHARS {
            return Err(ConsultationError::InvalidMessage(format!(
                "content must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }
        let language = match language.map(str::trim).filter(|l| !l.is_empty()) {
            Some(l) if !is_language_code(l) => {
                return Err(ConsultationError::InvalidMessage(format!(
                    "invalid language code '{l}'"
                )))
            }
            other => other.map(|l| l.to_ascii_lowercase()),
        };

        let session = self.sessions.get_mut(&id).ok_or(ConsultationError::NotFound(id))?;
        if !who.can_access(session) {
            return Err(ConsultationError::AccessDenied);
        }
        if session.status.is_terminal() {
            return Err(ConsultationError::Closed(session.status));
        }

        let sender = match who.role {
            Role::Patient => MessageSender::Patient,
            Role::Doctor => MessageSender::Doctor,
            Role::Admin => MessageSender::System,
        };
        let now = Utc::now();
        let message = ConsultationMessage {
            id: Uuid::new_v4(),
            sender,
            sender_id: who.user_id.to_string(),
            content: content.to_string(),
            language,
            sent_at: now,
        };

        if sender == MessageSender::Doctor && session.status == ConsultationStatus::Pending {
            session.status = ConsultationStatus::Active;
            tracing::info!(consultation_id = %id, "Consultation active after first doctor message");
        }
        session.messages.push(message.clone());
        session.updated_at = now;
        Ok(message)
    }

    /// Cancelling needs only participation; any other move needs
    /// `ManageConsultations`.
    pub fn set_status(
        &mut self,
        id: Uuid,
        who: Requester<'_>,
        status: ConsultationStatus,
    ) -> Result<ConsultationSession, ConsultationError> {
        let session = self.sessions.get_mut(&id).ok_or(ConsultationError::NotFound(id))?;
        if !who.can_access(session) {
            return Err(ConsultationError::AccessDenied);
        }
        if status != ConsultationStatus::Cancelled
            && !who.role.has_permission(Permission::ManageConsultations)
        {
            return Err(ConsultationError::AccessDenied);
        }
        if !session.status.can_transition_to(status) {
            return Err(ConsultationError::InvalidTransition {
                from: session.status,
                to: status,
            });
        }

        tracing::info!(
            consultation_id = %id,
            from = %session.status,
            to = %status,
            "Consultation status changed"
        );
        session.status = status;
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn is_language_code(code: &str) -> bool {
    code.len() <= MAX_LANGUAGE_CODE_CHARS
        && code.chars().all(|c| c.is_ascii_alphabetic() || c == '-')
}
