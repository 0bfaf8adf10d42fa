//! Consultation message translation with a per-consultation cache.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use uuid::Uuid;

use crate::models::{ConsultationMessage, ConsultationSession};
use crate::pipeline::llm::{CompletionRequest, LlmClient, LlmError};
use crate::pipeline::{prompts, AnalysisError};

/// ISO 639-1 codes accepted as translation targets.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "es", "fr", "de", "it", "pt", "zh", "ar", "hi"];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranslatedMessage {
    pub message_id: Uuid,
    pub original: String,
    pub translated: String,
    pub language: String,
}

type MessageCache = HashMap<(Uuid, String), String>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<Uuid, MessageCache>,
    /// Completed or cancelled consultations; never cached again.
    closed: HashSet<Uuid>,
}

pub struct TranslationService {
    llm: Arc<dyn LlmClient>,
    cache: Mutex<CacheState>,
}

impl TranslationService {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            cache: Mutex::new(CacheState::default()),
        }
    }

    pub fn is_supported(lang: &str) -> bool {
        SUPPORTED_LANGUAGES.contains(&lang)
    }

    pub async fn translate_message(
        &self,
        consultation_id: Uuid,
        message: &ConsultationMessage,
        target_lang: &str,
    ) -> Result<String, AnalysisError> {
        let target = target_lang.trim().to_ascii_lowercase();
        if !Self::is_supported(&target) {
            return Err(AnalysisError::UnsupportedLanguage(target_lang.to_string()));
        }

        if message.language.as_deref() == Some(target.as_str()) {
            return Ok(message.content.clone());
        }

        let key = (message.id, target.clone());
        if let Some(hit) = self.cached(consultation_id, &key) {
            return Ok(hit);
        }

        let source = message.language.as_deref().unwrap_or("auto");
        let request = CompletionRequest::text(
            "translate_message",
            prompts::translation_system(source, &target),
            prompts::translation_user(&message.content),
        )
        .with_temperature(0.1)
        .with_max_tokens(2_000);

        let raw = self.llm.complete(&request).await?;
        let translated = clean_translation(&raw);
        if translated.is_empty() {
            return Err(LlmError::MalformedResponse("empty translation".into()).into());
        }

        if let Ok(mut cache) = self.cache.lock() {
            if !cache.closed.contains(&consultation_id) {
                cache
                    .entries
                    .entry(consultation_id)
                    .or_default()
                    .insert(key, translated.clone());
            }
        }
        tracing::debug!(
            consultation_id = %consultation_id,
            message_id = %message.id,
            target = %target,
            "Message translated"
        );
        Ok(translated)
    }

    /// Translate every message of a consultation, in order. Closed
    /// consultations are translated without touching the cache.
    pub async fn translate_consultation(
        &self,
        session: &ConsultationSession,
        target_lang: &str,
    ) -> Result<Vec<TranslatedMessage>, AnalysisError> {
        if session.status.is_terminal() {
            self.clear_consultation(session.id);
        }
        let mut out = Vec::with_capacity(session.messages.len());
        for message in &session.messages {
            let translated = self.translate_message(session.id, message, target_lang).await?;
            out.push(TranslatedMessage {
                message_id: message.id,
                original: message.content.clone(),
                translated,
                language: target_lang.trim().to_ascii_lowercase(),
            });
        }
        Ok(out)
    }

    /// Drop cached translations for a closed consultation and stop caching
    /// it, including translations still in flight.
    pub fn clear_consultation(&self, consultation_id: Uuid) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.closed.insert(consultation_id);
            if cache.entries.remove(&consultation_id).is_some() {
                tracing::debug!(consultation_id = %consultation_id, "Translation cache cleared");
            }
        }
    }

    pub fn cached_count(&self, consultation_id: Uuid) -> usize {
        self.cache
            .lock()
            .map(|c| c.entries.get(&consultation_id).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    fn cached(&self, consultation_id: Uuid, key: &(Uuid, String)) -> Option<String> {
        self.cache
            .lock()
            .ok()?
            .entries
            .get(&consultation_id)?
            .get(key)
            .cloned()
    }
}

/// Strip wrapping quotes or delimiter tags the model may echo back.
fn clean_translation(raw: &str) -> String {
    let text = raw
        .trim()
        .trim_start_matches("<MESSAGE>")
        .trim_end_matches("</MESSAGE>")
        .trim();
    let text = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    text.trim().to_string()
}
