use std::sync::Arc;

use serde::Deserialize;

use super::llm::{parse_model_json, CompletionRequest, LlmClient, LlmError};
use super::{prompts, AnalysisError};
use crate::models::{
    validate_responses, AnswerOptions, Question, QuestionKind, QuestionResponse, SymptomData,
};

/// Options kept from the model before "Not sure" is appended.
pub const MAX_GENERATED_OPTIONS: usize = 6;
pub const MAX_SUGGESTIONS: usize = 3;
const MAX_OPTION_CHARS: usize = 120;
const NOT_SURE: &str = "Not sure";

static GENERIC_OPTIONS: &[&str] = &["Yes, definitely", "Somewhat", "No, not at all", NOT_SURE];

#[derive(Deserialize)]
struct ModelOptions {
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Deserialize)]
struct ModelSuggestions {
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Answer choices and typing suggestions for questionnaire questions.
pub struct AnswerGenerator {
    llm: Arc<dyn LlmClient>,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn options_for(
        &self,
        question: &Question,
        data: &SymptomData,
        responses: &[QuestionResponse],
    ) -> Result<AnswerOptions, AnalysisError> {
        data.validate()?;
        validate_responses(responses)?;

        let (options, allow_free_text) = match question.kind {
            QuestionKind::YesNo | QuestionKind::Emergency => {
                (vec!["Yes".to_string(), "No".to_string()], false)
            }
            QuestionKind::Scale => ((1..=10).map(|n| n.to_string()).collect(), false),
            QuestionKind::FreeText => (Vec::new(), true),
            QuestionKind::MultipleChoice => {
                let own = normalize_options(&question.options);
                let options = if own.len() >= 2 {
                    own
                } else {
                    match self.generate_options(question, data, responses).await {
                        Ok(generated) if generated.len() >= 2 => generated,
                        Ok(_) => {
                            tracing::debug!(question_id = %question.id, "Too few model options, using generic set");
                            generic_options()
                        }
                        Err(e) => {
                            tracing::warn!(question_id = %question.id, "Option generation failed: {e}");
                            generic_options()
                        }
                    }
                };
                (with_not_sure(options), true)
            }
        };

        Ok(AnswerOptions {
            question_id: question.id.clone(),
            options,
            allow_free_text,
        })
    }

    /// Completions for a partially typed free-text answer.
    pub async fn suggestions(
        &self,
        question: &Question,
        partial: &str,
        data: &SymptomData,
    ) -> Result<Vec<String>, AnalysisError> {
        data.validate()?;
        if partial.trim().is_empty() {
            return Ok(Vec::new());
        }

        let request = CompletionRequest::json(
            "answer_suggestions",
            prompts::suggestion_system(),
            prompts::suggestion_user(question, partial, data),
        )
        .with_temperature(0.5)
        .with_max_tokens(200);

        let parsed = match self.llm.complete(&request).await {
            Ok(raw) => parse_model_json::<ModelSuggestions>(&raw),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(s) => {
                let mut out = normalize_options(&s.suggestions);
                out.truncate(MAX_SUGGESTIONS);
                Ok(out)
            }
            Err(e) => {
                tracing::warn!(question_id = %question.id, "Suggestion generation failed: {e}");
                Ok(Vec::new())
            }
        }
    }

    async fn generate_options(
        &self,
        question: &Question,
        data: &SymptomData,
        responses: &[QuestionResponse],
    ) -> Result<Vec<String>, LlmError> {
        let request = CompletionRequest::json(
            "answer_options",
            prompts::options_system(),
            prompts::options_user(question, data, responses),
        )
        .with_max_tokens(300);
        let raw = self.llm.complete(&request).await?;
        let parsed: ModelOptions = parse_model_json(&raw)?;
        Ok(normalize_options(&parsed.options))
    }
}

/// Trim, drop empties and overlong entries, dedupe case-insensitively,
/// drop any "not sure" variant, cap the count.
fn normalize_options(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for opt in raw {
        let opt = opt.trim();
        if opt.is_empty()
            || opt.chars().count() > MAX_OPTION_CHARS
            || opt.eq_ignore_ascii_case(NOT_SURE)
            || out.iter().any(|o| o.to_lowercase() == opt.to_lowercase())
        {
            continue;
        }
        out.push(opt.to_string());
        if out.len() == MAX_GENERATED_OPTIONS {
            break;
        }
    }
    out
}

fn with_not_sure(mut options: Vec<String>) -> Vec<String> {
    if !options.iter().any(|o| o.eq_ignore_ascii_case(NOT_SURE)) {
        options.push(NOT_SURE.to_string());
    }
    options
}

fn generic_options() -> Vec<String> {
    GENERIC_OPTIONS.iter().map(|o| o.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, SymptomSeverity};
    use crate::pipeline::llm::MockLlmClient;

    fn data() -> SymptomData {
        SymptomData {
            age: 25,
            gender: Gender::Other,
            symptoms: "Stomach cramps after meals".into(),
            severity: SymptomSeverity::Moderate,
            duration: Some("1 week".into()),
        }
    }

    fn question(kind: QuestionKind, options: &[&str]) -> Question {
        Question {
            id: "q1".into(),
            text: "What makes it worse?".into(),
            kind,
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn yes_no_needs_no_model() {
        let mock = Arc::new(MockLlmClient::new());
        let gen = AnswerGenerator::new(mock.clone());
        let opts = gen
            .options_for(&question(QuestionKind::YesNo, &[]), &data(), &[])
            .await
            .unwrap();
        assert_eq!(opts.options, vec!["Yes", "No"]);
        assert!(!opts.allow_free_text);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn scale_is_one_to_ten() {
        let gen = AnswerGenerator::new(Arc::new(MockLlmClient::new()));
        let opts = gen
            .options_for(&question(QuestionKind::Scale, &[]), &data(), &[])
            .await
            .unwrap();
        assert_eq!(opts.options.len(), 10);
        assert_eq!(opts.options.first().map(String::as_str), Some("1"));
        assert_eq!(opts.options.last().map(String::as_str), Some("10"));
    }

    #[tokio::test]
    async fn free_text_allows_typing() {
        let gen = AnswerGenerator::new(Arc::new(MockLlmClient::new()));
        let opts = gen
            .options_for(&question(QuestionKind::FreeText, &[]), &data(), &[])
            .await
            .unwrap();
        assert!(opts.options.is_empty());
        assert!(opts.allow_free_text);
    }

    #[tokio::test]
    async fn own_options_used_when_present() {
        let mock = Arc::new(MockLlmClient::new());
        let gen = AnswerGenerator::new(mock.clone());
        let opts = gen
            .options_for(
                &question(QuestionKind::MultipleChoice, &["Eating", " eating ", "Lying down"]),
                &data(),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(opts.options, vec!["Eating", "Lying down", "Not sure"]);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn model_options_capped_and_deduped() {
        let mock = Arc::new(MockLlmClient::with_replies([
            r#"{"options": ["Fatty food", "fatty food", "Coffee", "Alcohol", "Stress",
                "Spicy food", "Lying down", "Exercise", "not sure", ""]}"#,
        ]));
        let gen = AnswerGenerator::new(mock.clone());
        let opts = gen
            .options_for(&question(QuestionKind::MultipleChoice, &[]), &data(), &[])
            .await
            .unwrap();
        assert_eq!(
            opts.options,
            vec!["Fatty food", "Coffee", "Alcohol", "Stress", "Spicy food", "Lying down", "Not sure"]
        );
        assert!(opts.allow_free_text);
        assert_eq!(mock.requests()[0].task, "answer_options");
    }

    #[tokio::test]
    async fn model_failure_uses_generic_options() {
        let gen = AnswerGenerator::new(Arc::new(MockLlmClient::new()));
        let opts = gen
            .options_for(&question(QuestionKind::MultipleChoice, &[]), &data(), &[])
            .await
            .unwrap();
        assert_eq!(opts.options, generic_options());
    }

    #[tokio::test]
    async fn suggestions_limited_to_three() {
        let mock = Arc::new(MockLlmClient::with_replies([
            r#"{"suggestions": ["after eating dairy", "after large meals", "in the morning", "at night"]}"#,
        ]));
        let gen = AnswerGenerator::new(mock.clone());
        let out = gen
            .suggestions(&question(QuestionKind::FreeText, &[]), "it gets worse", &data())
            .await
            .unwrap();
        assert_eq!(out, vec!["after eating dairy", "after large meals", "in the morning"]);
    }

    #[tokio::test]
    async fn empty_partial_skips_model() {
        let mock = Arc::new(MockLlmClient::new());
        let gen = AnswerGenerator::new(mock.clone());
        let out = gen
            .suggestions(&question(QuestionKind::FreeText, &[]), "   ", &data())
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn suggestion_failure_returns_empty() {
        let gen = AnswerGenerator::new(Arc::new(MockLlmClient::new()));
        let out = gen
            .suggestions(&question(QuestionKind::FreeText, &[]), "sharp", &data())
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
