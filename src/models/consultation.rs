use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ConsultationStatus, MessageSender};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationMessage {
    pub id: Uuid,
    pub sender: MessageSender,
    pub sender_id: String,
    pub content: String,
    /// ISO 639-1 code of the original text, when known.
    pub language: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationSession {
    pub id: Uuid,
    pub patient_id: String,
    pub doctor: DoctorInfo,
    pub messages: Vec<ConsultationMessage>,
    pub status: ConsultationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsultationSession {
    /// Patient or assigned doctor.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.patient_id == user_id || self.doctor.id == user_id
    }
}
