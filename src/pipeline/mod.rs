pub mod analyzer;
pub mod answers;
pub mod llm;
pub mod prompts;
pub mod questionnaire;
pub mod safety;

pub use analyzer::SymptomAnalyzer;
pub use answers::AnswerGenerator;
pub use questionnaire::QuestionGenerator;

use thiserror::Error;

use crate::models::{QuestionResponse, SymptomData, ValidationError};
use llm::LlmError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// The patient's own words: symptom description plus every answer.
/// Question texts are excluded since the emergency probe itself names
/// warning signs.
pub(crate) fn patient_text(data: &SymptomData, responses: &[QuestionResponse]) -> String {
    let mut text = data.symptoms.clone();
    for r in responses {
        text.push('\n');
        text.push_str(&r.answer);
    }
    text
}
