use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{AssessmentSeverity, AssessmentSource, DetectionMethod};

/// Shown with every assessment.
pub const MEDICAL_DISCLAIMER: &str = "This assessment is informational and is not a medical \
     diagnosis. Always consult a qualified healthcare professional. If you think you are \
     having a medical emergency, call your local emergency number.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PossibleCondition {
    pub name: String,
    pub probability: f32,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub severity: AssessmentSeverity,
    pub possible_conditions: Vec<PossibleCondition>,
    pub recommendations: Vec<String>,
    pub is_emergency: bool,
    pub emergency_reason: Option<String>,
    pub follow_up: Option<String>,
    pub source: AssessmentSource,
    pub disclaimer: String,
    pub generated_at: DateTime<Utc>,
}

/// Outcome of the emergency detection step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyCheck {
    pub is_emergency: bool,
    pub confidence: f32,
    pub reason: Option<String>,
    /// Ids of keyword rules that matched, in rule order.
    pub matched_rules: Vec<String>,
    pub checked_by: DetectionMethod,
}

impl EmergencyCheck {
    pub fn clear(checked_by: DetectionMethod) -> Self {
        Self {
            is_emergency: false,
            confidence: 0.0,
            reason: None,
            matched_rules: Vec::new(),
            checked_by,
        }
    }
}
