//! Hard-coded emergency keyword rules.
//!
//! Runs before any model call and cannot be overridden by model output.
//! Keywords are matched case-insensitively as whole words or phrases in
//! the patient's own words (symptom description plus answers), so
//! "backstroke" never fires the stroke rule.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyCategory {
    Cardiac,
    Respiratory,
    Stroke,
    Bleeding,
    Unconsciousness,
    Seizure,
    SelfHarm,
    Anaphylaxis,
    InfantFever,
}

/// A rule that fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyMatch {
    pub rule_id: &'static str,
    pub category: EmergencyCategory,
    pub keyword: &'static str,
    pub guidance: &'static str,
}

struct EmergencyRule {
    id: &'static str,
    category: EmergencyCategory,
    keywords: &'static [&'static str],
    /// Fires only when the patient is younger than this many years.
    max_age_exclusive: Option<u8>,
    guidance: &'static str,
}

// ── Keyword sets ────────────────────────────────────────────

static CHEST_PAIN_KEYWORDS: &[&str] = &[
    "chest pain", "chest pressure", "chest tightness", "crushing pain",
    "pain radiating to my arm", "pain in my left arm", "heart attack",
    "dolor de pecho", "douleur thoracique", "brustschmerz",
];

static BREATHING_KEYWORDS: &[&str] = &[
    "can't breathe", "cannot breathe", "can not breathe", "difficulty breathing",
    "trouble breathing", "short of breath", "shortness of breath", "gasping",
    "i'm choking", "i am choking", "lips turning blue", "blue lips",
    "no puedo respirar", "je ne peux pas respirer", "atemnot",
];

static STROKE_KEYWORDS: &[&str] = &[
    "face drooping", "facial droop", "slurred speech", "can't speak",
    "numbness on one side", "weakness on one side", "sudden confusion",
    "worst headache of my life", "sudden vision loss", "stroke",
];

static BLEEDING_KEYWORDS: &[&str] = &[
    "severe bleeding", "won't stop bleeding", "bleeding won't stop",
    "heavy bleeding", "coughing up blood", "vomiting blood", "blood in vomit",
    "spurting blood",
];

static UNCONSCIOUS_KEYWORDS: &[&str] = &[
    "unconscious", "unresponsive", "passed out", "fainted and", "won't wake up",
    "not responding", "inconsciente", "inconscient", "bewusstlos",
];

static SEIZURE_KEYWORDS: &[&str] = &[
    "seizure", "seizures", "convulsion", "convulsions", "convulsing",
    "having a fit", "convulsión",
    "krampfanfall",
];

static SELF_HARM_KEYWORDS: &[&str] = &[
    "suicidal", "suicide", "kill myself", "end my life", "want to die",
    "hurt myself", "self harm", "self-harm", "overdose",
];

static ANAPHYLAXIS_KEYWORDS: &[&str] = &[
    "anaphylaxis", "anaphylactic", "throat closing", "throat is closing",
    "tongue swelling", "swollen tongue", "swelling of the throat",
    "severe allergic reaction",
];

static FEVER_KEYWORDS: &[&str] = &[
    "fever", "high temperature", "fiebre", "fièvre", "fieber",
];

// ── Rule registry ───────────────────────────────────────────

static RULES: &[EmergencyRule] = &[
    EmergencyRule {
        id: "CARD-001",
        category: EmergencyCategory::Cardiac,
        keywords: CHEST_PAIN_KEYWORDS,
        max_age_exclusive: None,
        guidance: "Chest pain or pressure can signal a heart attack. Call emergency services now.",
    },
    EmergencyRule {
        id: "RESP-001",
        category: EmergencyCategory::Respiratory,
        keywords: BREATHING_KEYWORDS,
        max_age_exclusive: None,
        guidance: "Severe difficulty breathing needs immediate care. Call emergency services now.",
    },
    EmergencyRule {
        id: "NEURO-001",
        category: EmergencyCategory::Stroke,
        keywords: STROKE_KEYWORDS,
        max_age_exclusive: None,
        guidance: "These may be signs of a stroke. Note the time symptoms started and call emergency services now.",
    },
    EmergencyRule {
        id: "BLEED-001",
        category: EmergencyCategory::Bleeding,
        keywords: BLEEDING_KEYWORDS,
        max_age_exclusive: None,
        guidance: "Apply firm pressure to the wound and call emergency services now.",
    },
    EmergencyRule {
        id: "NEURO-002",
        category: EmergencyCategory::Unconsciousness,
        keywords: UNCONSCIOUS_KEYWORDS,
        max_age_exclusive: None,
        guidance: "An unresponsive person needs immediate help. Call emergency services now.",
    },
    EmergencyRule {
        id: "NEURO-003",
        category: EmergencyCategory::Seizure,
        keywords: SEIZURE_KEYWORDS,
        max_age_exclusive: None,
        guidance: "Place the person on their side, do not put anything in their mouth, and call emergency services.",
    },
    EmergencyRule {
        id: "PSY-001",
        category: EmergencyCategory::SelfHarm,
        keywords: SELF_HARM_KEYWORDS,
        max_age_exclusive: None,
        guidance: "You are not alone. Call emergency services or a crisis line such as 988 right now.",
    },
    EmergencyRule {
        id: "ALLERGY-001",
        category: EmergencyCategory::Anaphylaxis,
        keywords: ANAPHYLAXIS_KEYWORDS,
        max_age_exclusive: None,
        guidance: "Use an epinephrine auto-injector if available and call emergency services now.",
    },
    EmergencyRule {
        id: "PED-001",
        category: EmergencyCategory::InfantFever,
        keywords: FEVER_KEYWORDS,
        max_age_exclusive: Some(1),
        guidance: "Any fever in a young infant needs urgent medical evaluation. Contact a doctor or go to the emergency room now.",
    },
];

// ── Matching ────────────────────────────────────────────────

/// One `\b(?:kw|kw|...)\b` pattern per rule, index-aligned with `RULES`.
static RULE_PATTERNS: LazyLock<Vec<Option<Regex>>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|rule| {
            let alternation = rule
                .keywords
                .iter()
                .map(|kw| regex::escape(kw))
                .collect::<Vec<_>>()
                .join("|");
            match Regex::new(&format!(r"\b(?:{alternation})\b")) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::error!(rule = rule.id, "Invalid emergency pattern: {e}");
                    None
                }
            }
        })
        .collect()
});

/// First keyword of `rule` present in `lower`. Falls back to substring
/// matching if the rule's pattern failed to compile.
fn matched_keyword(index: usize, rule: &EmergencyRule, lower: &str) -> Option<&'static str> {
    match RULE_PATTERNS.get(index).and_then(Option::as_ref) {
        Some(re) => {
            let found = re.find(lower)?;
            rule.keywords.iter().copied().find(|kw| *kw == found.as_str())
        }
        None => rule.keywords.iter().copied().find(|kw| lower.contains(kw)),
    }
}

/// Every rule that fires for `text`, in rule order. One match per rule.
pub fn scan(text: &str, age: Option<u8>) -> Vec<EmergencyMatch> {
    let lower = text.to_lowercase();
    let matches: Vec<EmergencyMatch> = RULES
        .iter()
        .enumerate()
        .filter(|(_, rule)| match (rule.max_age_exclusive, age) {
            (Some(limit), Some(age)) => age < limit,
            (Some(_), None) => false,
            (None, _) => true,
        })
        .filter_map(|(index, rule)| {
            matched_keyword(index, rule, &lower).map(|keyword| EmergencyMatch {
                rule_id: rule.id,
                category: rule.category,
                keyword,
                guidance: rule.guidance,
            })
        })
        .collect();

    if !matches.is_empty() {
        tracing::warn!(
            rules = ?matches.iter().map(|m| m.rule_id).collect::<Vec<_>>(),
            "Emergency keyword rules fired"
        );
    }
    matches
}

/// Patient-facing message for a set of matches.
pub fn emergency_message(matches: &[EmergencyMatch]) -> String {
    match matches.first() {
        Some(first) => format!(
            "{} If you are in immediate danger, call your local emergency number (911, 112 or 999).",
            first.guidance
        ),
        None => "Your answers suggest a possible emergency. Call your local emergency number (911, 112 or 999) or go to the nearest emergency room.".to_string(),
    }
}
