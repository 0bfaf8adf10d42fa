use serde::{Deserialize, Serialize};

use super::assessment::EmergencyCheck;
use super::enums::QuestionKind;

/// Fixed id of the emergency probe question.
pub const EMERGENCY_PROBE_ID: &str = "emergency_probe";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
}

impl Question {
    /// The yes/no probe asked when emergency warning signs show up.
    pub fn emergency_probe(signs: &[&str]) -> Self {
        let text = if signs.is_empty() {
            "Are you experiencing any severe or rapidly worsening symptoms right now?".to_string()
        } else {
            format!(
                "Are you experiencing any of the following right now: {}?",
                signs.join(", ")
            )
        };
        Self {
            id: EMERGENCY_PROBE_ID.to_string(),
            text,
            kind: QuestionKind::Emergency,
            options: vec!["Yes".to_string(), "No".to_string()],
        }
    }
}

/// What the questionnaire should do next.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum QuestionStep {
    Ask { question: Question },
    Complete { reason: String },
    Emergency { check: EmergencyCheck, message: String },
}

/// Selectable answers for a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerOptions {
    pub question_id: String,
    pub options: Vec<String>,
    pub allow_free_text: bool,
}
