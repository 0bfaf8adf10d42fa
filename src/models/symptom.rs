use serde::{Deserialize, Serialize};

use super::enums::{Gender, SymptomSeverity};
use super::ValidationError;

pub const MAX_AGE: u8 = 120;
pub const MIN_SYMPTOM_CHARS: usize = 3;
pub const MAX_SYMPTOM_CHARS: usize = 2_000;
pub const MAX_DURATION_CHARS: usize = 100;
pub const MAX_ANSWER_CHARS: usize = 1_000;
/// Upper bound on answered questions accepted in one request.
pub const MAX_RESPONSES: usize = 30;

/// Initial symptom report submitted by the patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomData {
    pub age: u8,
    pub gender: Gender,
    pub symptoms: String,
    pub severity: SymptomSeverity,
    #[serde(default)]
    pub duration: Option<String>,
}

impl SymptomData {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.age > MAX_AGE {
            return Err(ValidationError::field("age", format!("must be at most {MAX_AGE}")));
        }
        let len = self.symptoms.trim().chars().count();
        if len < MIN_SYMPTOM_CHARS {
            return Err(ValidationError::field(
                "symptoms",
                format!("must be at least {MIN_SYMPTOM_CHARS} characters"),
            ));
        }
        if len > MAX_SYMPTOM_CHARS {
            return Err(ValidationError::field(
                "symptoms",
                format!("must be at most {MAX_SYMPTOM_CHARS} characters"),
            ));
        }
        if let Some(duration) = &self.duration {
            if duration.chars().count() > MAX_DURATION_CHARS {
                return Err(ValidationError::field(
                    "duration",
                    format!("must be at most {MAX_DURATION_CHARS} characters"),
                ));
            }
        }
        Ok(())
    }
}

/// One answered questionnaire question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionResponse {
    pub question_id: String,
    #[serde(default)]
    pub question: String,
    pub answer: String,
}

impl QuestionResponse {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.question_id.trim().is_empty() {
            return Err(ValidationError::field("question_id", "must not be empty"));
        }
        if self.answer.chars().count() > MAX_ANSWER_CHARS {
            return Err(ValidationError::field(
                "answer",
                format!("must be at most {MAX_ANSWER_CHARS} characters"),
            ));
        }
        Ok(())
    }

    /// Whether the answer is an affirmative yes.
    pub fn is_affirmative(&self) -> bool {
        matches!(
            self.answer.trim().to_lowercase().as_str(),
            "yes" | "y" | "true" | "oui" | "sí" | "si" | "ja"
        )
    }
}

/// Validate a full questionnaire submission.
pub fn validate_responses(responses: &[QuestionResponse]) -> Result<(), ValidationError> {
    if responses.len() > MAX_RESPONSES {
        return Err(ValidationError::field(
            "responses",
            format!("must contain at most {MAX_RESPONSES} entries"),
        ));
    }
    responses.iter().try_for_each(QuestionResponse::validate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SymptomData {
        SymptomData {
            age: 34,
            gender: Gender::Female,
            symptoms: "Headache and mild nausea since yesterday".into(),
            severity: SymptomSeverity::Moderate,
            duration: Some("2 days".into()),
        }
    }

    #[test]
    fn valid_symptom_data_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn age_above_limit_rejected() {
        let mut data = sample();
        data.age = 121;
        let err = data.validate().unwrap_err();
        assert_eq!(err.field_name(), Some("age"));
    }

    #[test]
    fn whitespace_only_symptoms_rejected() {
        let mut data = sample();
        data.symptoms = "   a  ".into();
        assert!(data.validate().is_err());
    }

    #[test]
    fn overlong_symptoms_rejected() {
        let mut data = sample();
        data.symptoms = "x".repeat(MAX_SYMPTOM_CHARS + 1);
        assert!(data.validate().is_err());
    }

    #[test]
    fn deserializes_without_duration() {
        let json = r#"{"age":5,"gender":"male","symptoms":"cough","severity":"mild"}"#;
        let data: SymptomData = serde_json::from_str(json).unwrap();
        assert!(data.duration.is_none());
        assert_eq!(data.severity, SymptomSeverity::Mild);
    }

    #[test]
    fn response_requires_question_id() {
        let r = QuestionResponse {
            question_id: " ".into(),
            question: String::new(),
            answer: "yes".into(),
        };
        assert!(r.validate().is_err());
    }

    #[test]
    fn affirmative_answers_recognized() {
        let mut r = QuestionResponse {
            question_id: "q1".into(),
            question: String::new(),
            answer: " Yes ".into(),
        };
        assert!(r.is_affirmative());
        r.answer = "no".into();
        assert!(!r.is_affirmative());
    }

    #[test]
    fn too_many_responses_rejected() {
        let responses: Vec<QuestionResponse> = (0..=MAX_RESPONSES)
            .map(|i| QuestionResponse {
                question_id: format!("q{i}"),
                question: String::new(),
                answer: "no".into(),
            })
            .collect();
        let err = validate_responses(&responses).unwrap_err();
        assert_eq!(err.field_name(), Some("responses"));
    }
}
