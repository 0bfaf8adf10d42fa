use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use super::llm::{parse_model_json, CompletionRequest, LlmClient, LlmError};
use super::safety::{emergency_message, scan};
use super::{patient_text, prompts, AnalysisError};
use crate::models::{
    validate_responses, AssessmentResult, AssessmentSeverity, AssessmentSource, DetectionMethod,
    EmergencyCheck, PossibleCondition, QuestionResponse, SymptomData, SymptomSeverity,
    ValidationError, MEDICAL_DISCLAIMER,
};

/// Minimum model confidence for an emergency verdict.
pub const EMERGENCY_CONFIDENCE_THRESHOLD: f32 = 0.7;
pub const MAX_CONDITIONS: usize = 5;
const MAX_EMERGENCY_TEXT_CHARS: usize = 8_000;

#[derive(Debug, Deserialize)]
struct ModelEmergency {
    #[serde(default)]
    is_emergency: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelCondition {
    #[serde(default)]
    name: String,
    #[serde(default)]
    probability: Option<f32>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelAssessment {
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    possible_conditions: Vec<ModelCondition>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    is_emergency: bool,
    #[serde(default)]
    emergency_reason: Option<String>,
    #[serde(default)]
    follow_up: Option<String>,
}

pub struct SymptomAnalyzer {
    llm: Arc<dyn LlmClient>,
}

impl SymptomAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Keyword rules first; the model is only consulted when none fire.
    pub async fn check_emergency(
        &self,
        text: &str,
        age: Option<u8>,
    ) -> Result<EmergencyCheck, AnalysisError> {
        let len = text.trim().chars().count();
        if len == 0 {
            return Err(ValidationError::field("text", "must not be empty").into());
        }
        if len > MAX_EMERGENCY_TEXT_CHARS {
            return Err(ValidationError::field(
                "text",
                format!("must be at most {MAX_EMERGENCY_TEXT_CHARS} characters"),
            )
            .into());
        }
        Ok(self.detect_emergency(text, age).await)
    }

    async fn detect_emergency(&self, text: &str, age: Option<u8>) -> EmergencyCheck {
        let matches = scan(text, age);
        if !matches.is_empty() {
            return EmergencyCheck {
                is_emergency: true,
                confidence: 1.0,
                reason: Some(emergency_message(&matches)),
                matched_rules: matches.iter().map(|m| m.rule_id.to_string()).collect(),
                checked_by: DetectionMethod::Keywords,
            };
        }

        match self.ask_emergency(text, age).await {
            Ok(verdict) => {
                let confidence = clamp_unit(verdict.confidence);
                let is_emergency =
                    verdict.is_emergency && confidence >= EMERGENCY_CONFIDENCE_THRESHOLD;
                if verdict.is_emergency && !is_emergency {
                    tracing::debug!(confidence, "Model emergency verdict below threshold");
                }
                EmergencyCheck {
                    is_emergency,
                    confidence,
                    reason: verdict.reason.filter(|r| !r.trim().is_empty()),
                    matched_rules: Vec::new(),
                    checked_by: DetectionMethod::Model,
                }
            }
            Err(e) => {
                tracing::warn!("Emergency model check failed, keyword result stands: {e}");
                EmergencyCheck::clear(DetectionMethod::Keywords)
            }
        }
    }

    pub async fn assess(
        &self,
        data: &SymptomData,
        responses: &[QuestionResponse],
    ) -> Result<AssessmentResult, AnalysisError> {
        data.validate()?;
        validate_responses(responses)?;

        let check = self
            .detect_emergency(&patient_text(data, responses), Some(data.age))
            .await;
        if check.is_emergency {
            tracing::warn!(
                checked_by = %check.checked_by,
                rules = ?check.matched_rules,
                "Emergency detected during assessment"
            );
            return Ok(emergency_assessment(&check));
        }

        let result = match self.ask_assessment(data, responses).await {
            Ok(model) => match normalize(model, data.severity) {
                Some(result) => result,
                None => {
                    tracing::warn!("Model assessment unusable, using fallback");
                    fallback_assessment(data.severity)
                }
            },
            Err(e) => {
                tracing::warn!("Assessment model call failed, using fallback: {e}");
                fallback_assessment(data.severity)
            }
        };

        tracing::info!(
            severity = %result.severity,
            source = %result.source,
            conditions = result.possible_conditions.len(),
            "Assessment generated"
        );
        Ok(result)
    }

    async fn ask_emergency(&self, text: &str, age: Option<u8>) -> Result<ModelEmergency, LlmError> {
        let request = CompletionRequest::json(
            "emergency_check",
            prompts::emergency_system(),
            prompts::emergency_user(text, age),
        )
        .with_temperature(0.0)
        .with_max_tokens(150);
        let raw = self.llm.complete(&request).await?;
        parse_model_json(&raw)
    }

    async fn ask_assessment(
        &self,
        data: &SymptomData,
        responses: &[QuestionResponse],
    ) -> Result<ModelAssessment, LlmError> {
        let request = CompletionRequest::json(
            "assessment",
            prompts::assessment_system(),
            prompts::patient_context(data, responses),
        )
        .with_temperature(0.2)
        .with_max_tokens(1_200);
        let raw = self.llm.complete(&request).await?;
        parse_model_json(&raw)
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// `None` when the model output cannot be trusted at all.
fn normalize(model: ModelAssessment, reported: SymptomSeverity) -> Option<AssessmentResult> {
    let mut severity = AssessmentSeverity::from_str(model.severity.as_deref()?.trim()).ok()?;

    let mut conditions: Vec<PossibleCondition> = model
        .possible_conditions
        .into_iter()
        .filter_map(|c| {
            let name = c.name.trim().to_string();
            (!name.is_empty()).then(|| PossibleCondition {
                name,
                probability: clamp_unit(c.probability.unwrap_or(0.0)),
                description: c.description.filter(|d| !d.trim().is_empty()),
            })
        })
        .collect();
    conditions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    conditions.truncate(MAX_CONDITIONS);

    if reported == SymptomSeverity::Severe {
        severity = severity.max(AssessmentSeverity::Moderate);
    }

    let is_emergency = model.is_emergency || severity == AssessmentSeverity::Emergency;
    if is_emergency {
        severity = AssessmentSeverity::Emergency;
    }

    let mut recommendations: Vec<String> = model
        .recommendations
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if recommendations.is_empty() {
        recommendations = default_recommendations(severity);
    }

    Some(AssessmentResult {
        severity,
        possible_conditions: conditions,
        recommendations,
        is_emergency,
        emergency_reason: if is_emergency {
            model.emergency_reason.filter(|r| !r.trim().is_empty())
        } else {
            None
        },
        follow_up: model.follow_up.filter(|f| !f.trim().is_empty()),
        source: AssessmentSource::Model,
        disclaimer: MEDICAL_DISCLAIMER.to_string(),
        generated_at: Utc::now(),
    })
}

fn default_recommendations(severity: AssessmentSeverity) -> Vec<String> {
    let recs: &[&str] = match severity {
        AssessmentSeverity::Low => &[
            "Rest and stay hydrated.",
            "Monitor your symptoms and note any changes.",
            "See a doctor if symptoms persist beyond a few days or get worse.",
        ],
        AssessmentSeverity::Moderate => &[
            "Book an appointment with your doctor within the next day or two.",
            "Monitor your symptoms and note any changes.",
            "Seek urgent care if symptoms get significantly worse.",
        ],
        AssessmentSeverity::High => &[
            "Contact a doctor or urgent care service today.",
            "Do not wait for symptoms to resolve on their own.",
            "Call emergency services if you develop severe or new symptoms.",
        ],
        AssessmentSeverity::Emergency => EMERGENCY_RECOMMENDATIONS,
    };
    recs.iter().map(|r| r.to_string()).collect()
}

static EMERGENCY_RECOMMENDATIONS: &[&str] = &[
    "Call your local emergency number (911, 112 or 999) now.",
    "Do not drive yourself to the hospital.",
    "If someone is with you, ask them to stay until help arrives.",
];

fn emergency_assessment(check: &EmergencyCheck) -> AssessmentResult {
    AssessmentResult {
        severity: AssessmentSeverity::Emergency,
        possible_conditions: Vec::new(),
        recommendations: default_recommendations(AssessmentSeverity::Emergency),
        is_emergency: true,
        emergency_reason: check.reason.clone(),
        follow_up: None,
        source: AssessmentSource::EmergencyRules,
        disclaimer: MEDICAL_DISCLAIMER.to_string(),
        generated_at: Utc::now(),
    }
}

/// Conservative result derived only from the self-reported severity.
fn fallback_assessment(reported: SymptomSeverity) -> AssessmentResult {
    let severity = match reported {
        SymptomSeverity::Mild => AssessmentSeverity::Low,
        SymptomSeverity::Moderate => AssessmentSeverity::Moderate,
        SymptomSeverity::Severe => AssessmentSeverity::High,
    };
    AssessmentResult {
        severity,
        possible_conditions: Vec::new(),
        recommendations: default_recommendations(severity),
        is_emergency: false,
        emergency_reason: None,
        follow_up: Some(
            "An automated assessment could not be completed. Please consult a healthcare professional about these symptoms."
                .into(),
        ),
        source: AssessmentSource::Fallback,
        disclaimer: MEDICAL_DISCLAIMER.to_string(),
        generated_at: Utc::now(),
    }
}
