//! Adaptive follow-up questions.
//!
//! Order of precedence for each step:
//! 1. A confirmed emergency probe ends the questionnaire as an emergency.
//! 2. Emergency keywords in the patient's words trigger the probe once.
//! 3. The question limit ends the questionnaire.
//! 4. The model proposes the next question.
//! 5. If the model fails, a static fallback list is walked in order.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use super::llm::{parse_model_json, CompletionRequest, LlmClient, LlmError};
use super::safety::{emergency_message, scan};
use super::{patient_text, prompts, AnalysisError};
use crate::models::{
    validate_responses, DetectionMethod, EmergencyCheck, Question, QuestionKind,
    QuestionResponse, QuestionStep, SymptomData, EMERGENCY_PROBE_ID,
};

/// Questions asked before the questionnaire completes on its own.
pub const MAX_QUESTIONS: usize = 10;

/// The model may only end the questionnaire after this many answers.
pub const MIN_RESPONSES_FOR_COMPLETION: usize = 3;

/// Model output for the next question.
#[derive(Debug, Deserialize)]
struct ModelQuestion {
    #[serde(default)]
    question: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    enough_information: bool,
    #[serde(default)]
    emergency: bool,
}

struct FallbackQuestion {
    id: &'static str,
    text: &'static str,
    kind: QuestionKind,
    options: &'static [&'static str],
}

static FALLBACK_QUESTIONS: &[FallbackQuestion] = &[
    FallbackQuestion {
        id: "fallback_onset",
        text: "When did your symptoms start?",
        kind: QuestionKind::MultipleChoice,
        options: &[
            "Less than 24 hours ago",
            "1-3 days ago",
            "4-7 days ago",
            "More than a week ago",
        ],
    },
    FallbackQuestion {
        id: "fallback_progression",
        text: "Are your symptoms getting better, getting worse, or staying the same?",
        kind: QuestionKind::MultipleChoice,
        options: &[
            "Getting better",
            "Getting worse",
            "Staying the same",
            "Coming and going",
        ],
    },
    FallbackQuestion {
        id: "fallback_intensity",
        text: "On a scale of 1 to 10, how much are your symptoms affecting you right now?",
        kind: QuestionKind::Scale,
        options: &[],
    },
    FallbackQuestion {
        id: "fallback_fever",
        text: "Have you had a fever (38°C / 100.4°F or higher)?",
        kind: QuestionKind::YesNo,
        options: &[],
    },
    FallbackQuestion {
        id: "fallback_medications",
        text: "Are you taking any medications, or have you tried any treatment for this?",
        kind: QuestionKind::FreeText,
        options: &[],
    },
    FallbackQuestion {
        id: "fallback_conditions",
        text: "Do you have any ongoing medical conditions or allergies?",
        kind: QuestionKind::FreeText,
        options: &[],
    },
    FallbackQuestion {
        id: "fallback_other",
        text: "Is there anything else about your symptoms you think is important?",
        kind: QuestionKind::FreeText,
        options: &[],
    },
];

pub struct QuestionGenerator {
    llm: Arc<dyn LlmClient>,
}

impl QuestionGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn next_question(
        &self,
        data: &SymptomData,
        responses: &[QuestionResponse],
    ) -> Result<QuestionStep, AnalysisError> {
        data.validate()?;
        validate_responses(responses)?;

        let probe = responses.iter().find(|r| r.question_id == EMERGENCY_PROBE_ID);
        let matches = scan(&patient_text(data, responses), Some(data.age));

        if let Some(probe) = probe {
            if probe.is_affirmative() {
                tracing::warn!(
                    rules = matches.len(),
                    "Patient confirmed emergency warning signs"
                );
                let check = EmergencyCheck {
                    is_emergency: true,
                    confidence: 1.0,
                    reason: Some("Patient confirmed emergency warning signs".into()),
                    matched_rules: matches.iter().map(|m| m.rule_id.to_string()).collect(),
                    checked_by: DetectionMethod::PatientConfirmed,
                };
                return Ok(QuestionStep::Emergency {
                    check,
                    message: emergency_message(&matches),
                });
            }
        } else if !matches.is_empty() {
            let signs: Vec<&str> = matches.iter().map(|m| m.keyword).collect();
            return Ok(QuestionStep::Ask {
                question: Question::emergency_probe(&signs),
            });
        }

        if responses.len() >= MAX_QUESTIONS {
            return Ok(QuestionStep::Complete {
                reason: "question limit reached".into(),
            });
        }

        match self.ask_model(data, responses).await {
            Ok(model) => Ok(self.interpret(model, responses, probe.is_some())),
            Err(e) => {
                tracing::warn!("Question generation failed, using fallback list: {e}");
                Ok(fallback_step(responses))
            }
        }
    }

    async fn ask_model(
        &self,
        data: &SymptomData,
        responses: &[QuestionResponse],
    ) -> Result<ModelQuestion, LlmError> {
        let request = CompletionRequest::json(
            "next_question",
            prompts::question_system(),
            prompts::patient_context(data, responses),
        )
        .with_max_tokens(400);
        let raw = self.llm.complete(&request).await?;
        parse_model_json(&raw)
    }

    fn interpret(
        &self,
        model: ModelQuestion,
        responses: &[QuestionResponse],
        probe_asked: bool,
    ) -> QuestionStep {
        if model.emergency && !probe_asked {
            tracing::warn!("Model flagged possible emergency, probing patient");
            return QuestionStep::Ask {
                question: Question::emergency_probe(&[]),
            };
        }

        if model.enough_information && responses.len() >= MIN_RESPONSES_FOR_COMPLETION {
            return QuestionStep::Complete {
                reason: "enough information".into(),
            };
        }

        let text = model.question.trim();
        if text.is_empty() {
            tracing::debug!("Model returned no question text");
            return fallback_step(responses);
        }
        if already_asked(text, responses) {
            tracing::debug!("Model repeated an earlier question");
            return fallback_step(responses);
        }

        let options = clean_options(&model.options);
        let kind = match model.kind.as_deref().map(QuestionKind::from_str) {
            Some(Ok(QuestionKind::Emergency)) => QuestionKind::YesNo,
            Some(Ok(kind)) => kind,
            _ if options.len() >= 2 => QuestionKind::MultipleChoice,
            _ => QuestionKind::FreeText,
        };
        let options = match kind {
            QuestionKind::MultipleChoice => options,
            QuestionKind::YesNo => vec!["Yes".into(), "No".into()],
            _ => Vec::new(),
        };

        QuestionStep::Ask {
            question: Question {
                id: format!("q{}", responses.len() + 1),
                text: text.to_string(),
                kind,
                options,
            },
        }
    }
}

fn already_asked(text: &str, responses: &[QuestionResponse]) -> bool {
    let lower = text.to_lowercase();
    responses
        .iter()
        .any(|r| r.question.trim().to_lowercase() == lower)
}

fn clean_options(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for opt in raw {
        let opt = opt.trim();
        if !opt.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(opt)) {
            out.push(opt.to_string());
        }
    }
    out
}

/// Next fallback question not yet asked, or completion when none remain.
fn fallback_step(responses: &[QuestionResponse]) -> QuestionStep {
    let next = FALLBACK_QUESTIONS.iter().find(|f| {
        !responses.iter().any(|r| r.question_id == f.id) && !already_asked(f.text, responses)
    });

    match next {
        Some(f) => QuestionStep::Ask {
            question: Question {
                id: f.id.to_string(),
                text: f.text.to_string(),
                kind: f.kind,
                options: f.options.iter().map(|o| o.to_string()).collect(),
            },
        },
        None => QuestionStep::Complete {
            reason: "no further questions".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, SymptomSeverity};
    use crate::pipeline::llm::MockLlmClient;

    fn data(symptoms: &str) -> SymptomData {
        SymptomData {
            age: 30,
            gender: Gender::Female,
            symptoms: symptoms.into(),
            severity: SymptomSeverity::Mild,
            duration: None,
        }
    }

    fn answered(id: &str, question: &str, answer: &str) -> QuestionResponse {
        QuestionResponse {
            question_id: id.into(),
            question: question.into(),
            answer: answer.into(),
        }
    }

    fn generator(mock: &Arc<MockLlmClient>) -> QuestionGenerator {
        QuestionGenerator::new(mock.clone())
    }

    fn asked(step: QuestionStep) -> Question {
        match step {
            QuestionStep::Ask { question } => question,
            other => panic!("expected a question, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn model_question_returned() {
        let mock = Arc::new(MockLlmClient::with_replies([
            r#"{"question": "Where exactly is the headache?", "type": "multiple_choice",
                "options": ["Forehead", "Temples", "back of head", "Back of head"],
                "enough_information": false, "emergency": false}"#,
        ]));
        let q = asked(
            generator(&mock)
                .next_question(&data("dull headache"), &[])
                .await
                .unwrap(),
        );
        assert_eq!(q.id, "q1");
        assert_eq!(q.kind, QuestionKind::MultipleChoice);
        assert_eq!(q.options, vec!["Forehead", "Temples", "back of head"]);

        let request = &mock.requests()[0];
        assert!(request.json_mode);
        assert_eq!(request.task, "next_question");
        assert!(request.user.contains("dull headache"));
    }

    #[tokio::test]
    async fn keyword_hit_asks_probe_without_model() {
        let mock = Arc::new(MockLlmClient::new());
        let q = asked(
            generator(&mock)
                .next_question(&data("sudden chest pain at rest"), &[])
                .await
                .unwrap(),
        );
        assert_eq!(q.id, EMERGENCY_PROBE_ID);
        assert_eq!(q.kind, QuestionKind::Emergency);
        assert!(q.text.contains("chest pain"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn confirmed_probe_is_emergency() {
        let mock = Arc::new(MockLlmClient::new());
        let responses = vec![answered(EMERGENCY_PROBE_ID, "", "Yes")];
        let step = generator(&mock)
            .next_question(&data("chest pain"), &responses)
            .await
            .unwrap();
        match step {
            QuestionStep::Emergency { check, message } => {
                assert!(check.is_emergency);
                assert_eq!(check.checked_by, DetectionMethod::PatientConfirmed);
                assert_eq!(check.matched_rules, vec!["CARD-001"]);
                assert!(message.contains("heart attack"));
            }
            other => panic!("expected emergency, got {other:?}"),
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn denied_probe_continues_with_model() {
        let mock = Arc::new(MockLlmClient::with_replies([
            r#"{"question": "Does the pain change when you breathe in?", "type": "yes_no"}"#,
        ]));
        let responses = vec![answered(EMERGENCY_PROBE_ID, "Any chest pain now?", "No")];
        let q = asked(
            generator(&mock)
                .next_question(&data("chest pain after coughing"), &responses)
                .await
                .unwrap(),
        );
        assert_eq!(q.kind, QuestionKind::YesNo);
        assert_eq!(q.options, vec!["Yes", "No"]);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn model_emergency_flag_asks_probe_once() {
        let mock = Arc::new(MockLlmClient::with_replies([
            r#"{"question": "x", "emergency": true}"#,
        ]));
        let q = asked(
            generator(&mock)
                .next_question(&data("feeling strange"), &[])
                .await
                .unwrap(),
        );
        assert_eq!(q.id, EMERGENCY_PROBE_ID);
    }

    #[tokio::test]
    async fn question_limit_completes() {
        let mock = Arc::new(MockLlmClient::new());
        let responses: Vec<_> = (0..MAX_QUESTIONS)
            .map(|i| answered(&format!("q{i}"), &format!("question {i}"), "no"))
            .collect();
        let step = generator(&mock)
            .next_question(&data("itchy rash"), &responses)
            .await
            .unwrap();
        assert!(matches!(step, QuestionStep::Complete { .. }));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn enough_information_needs_minimum_answers() {
        let reply = r#"{"question": "Any nausea?", "type": "yes_no", "enough_information": true}"#;
        let mock = Arc::new(MockLlmClient::with_replies([reply, reply]));
        let gen = generator(&mock);

        let one = vec![answered("q1", "How long?", "2 days")];
        assert!(matches!(
            gen.next_question(&data("headache"), &one).await.unwrap(),
            QuestionStep::Ask { .. }
        ));

        let three = vec![
            answered("q1", "How long?", "2 days"),
            answered("q2", "Where?", "forehead"),
            answered("q3", "Severity?", "4"),
        ];
        assert!(matches!(
            gen.next_question(&data("headache"), &three).await.unwrap(),
            QuestionStep::Complete { .. }
        ));
    }

    #[tokio::test]
    async fn duplicate_question_falls_back() {
        let mock = Arc::new(MockLlmClient::with_replies([
            r#"{"question": "how long have you had it?", "type": "free_text"}"#,
        ]));
        let responses = vec![answered("q1", "How long have you had it?", "a week")];
        let q = asked(
            generator(&mock)
                .next_question(&data("back pain"), &responses)
                .await
                .unwrap(),
        );
        assert_eq!(q.id, "fallback_onset");
    }

    #[tokio::test]
    async fn model_failure_walks_fallback_list_then_completes() {
        let mock = Arc::new(MockLlmClient::new());
        let gen = generator(&mock);
        let mut responses = Vec::new();

        for expected in FALLBACK_QUESTIONS {
            let q = asked(gen.next_question(&data("ear ache"), &responses).await.unwrap());
            assert_eq!(q.id, expected.id);
            responses.push(answered(&q.id, &q.text, "not really"));
        }

        let step = gen.next_question(&data("ear ache"), &responses).await.unwrap();
        assert!(matches!(step, QuestionStep::Complete { .. }));
    }

    #[tokio::test]
    async fn unparseable_model_output_falls_back() {
        let mock = Arc::new(MockLlmClient::with_replies(["Sure! What else hurts?"]));
        let q = asked(
            generator(&mock)
                .next_question(&data("sore knee"), &[])
                .await
                .unwrap(),
        );
        assert_eq!(q.id, "fallback_onset");
    }

    #[tokio::test]
    async fn invalid_input_rejected() {
        let mock = Arc::new(MockLlmClient::new());
        let err = generator(&mock)
            .next_question(&data("x"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }
}
