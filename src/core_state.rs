//! Shared application state behind the HTTP surface.
//!
//! `CoreState` is built once at startup and wrapped in `Arc`. Session and
//! consultation stores sit behind `RwLock`; guards must be dropped before
//! any `.await`.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::audit::{AuditEntry, AuditError, AuditLogger};
use crate::config::Config;
use crate::consultation::ConsultationStore;
use crate::cookies::SecureCookieManager;
use crate::pipeline::llm::LlmClient;
use crate::pipeline::{AnswerGenerator, QuestionGenerator, SymptomAnalyzer};
use crate::session::SessionManager;
use crate::translation::TranslationService;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Audit store error: {0}")]
    Audit(#[from] AuditError),
}

pub struct CoreState {
    pub config: Config,
    sessions: RwLock<SessionManager>,
    consultations: RwLock<ConsultationStore>,
    pub cookies: SecureCookieManager,
    audit: AuditLogger,
    pub questions: QuestionGenerator,
    pub answers: AnswerGenerator,
    pub analyzer: SymptomAnalyzer,
    pub translator: TranslationService,
}

impl CoreState {
    /// State with a SQLite-backed audit trail under the configured data dir.
    pub fn new(config: Config, llm: Arc<dyn LlmClient>) -> Result<Self, CoreError> {
        let audit = AuditLogger::with_database(&config.audit_db_path())?;
        Ok(Self::with_audit(config, llm, audit))
    }

    pub fn with_audit(config: Config, llm: Arc<dyn LlmClient>, audit: AuditLogger) -> Self {
        Self {
            cookies: SecureCookieManager::new(config.cookie_secure),
            config,
            sessions: RwLock::new(SessionManager::new()),
            consultations: RwLock::new(ConsultationStore::new()),
            audit,
            questions: QuestionGenerator::new(llm.clone()),
            answers: AnswerGenerator::new(llm.clone()),
            analyzer: SymptomAnalyzer::new(llm.clone()),
            translator: TranslationService::new(llm),
        }
    }

    pub fn read_sessions(&self) -> Result<RwLockReadGuard<'_, SessionManager>, CoreError> {
        self.sessions.read().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn write_sessions(&self) -> Result<RwLockWriteGuard<'_, SessionManager>, CoreError> {
        self.sessions.write().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn read_consultations(
        &self,
    ) -> Result<RwLockReadGuard<'_, ConsultationStore>, CoreError> {
        self.consultations.read().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn write_consultations(
        &self,
    ) -> Result<RwLockWriteGuard<'_, ConsultationStore>, CoreError> {
        self.consultations.write().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn log(&self, entry: AuditEntry) {
        self.audit.log(entry);
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Periodic housekeeping: evict dead sessions, persist the audit buffer.
    pub fn maintenance(&self) -> Result<(usize, usize), CoreError> {
        let evicted = self.write_sessions()?.cleanup_expired();
        let flushed = self.audit.flush()?;
        if evicted > 0 || flushed > 0 {
            tracing::debug!(evicted, flushed, "Maintenance pass");
        }
        Ok((evicted, flushed))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use super::*;
    use crate::pipeline::llm::MockLlmClient;

    pub fn test_config() -> Config {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SYMCHECK_DATA_DIR", "/nonexistent/symptom-checker-test"),
            ("IDENTITY_API_KEY", "identity-secret"),
            ("COOKIE_SECURE", "false"),
        ]);
        Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
            .expect("test config is valid")
    }

    pub fn test_core(mock: Arc<MockLlmClient>) -> Arc<CoreState> {
        Arc::new(CoreState::with_audit(test_config(), mock, AuditLogger::in_memory()))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::audit::AuditEntry;
    use crate::models::{AuditEvent, AuditOutcome, Role};
    use crate::pipeline::llm::MockLlmClient;

    #[test]
    fn maintenance_runs_on_fresh_state() {
        let core = test_core(Arc::new(MockLlmClient::new()));
        core.write_sessions().unwrap().create("patient-1", Role::Patient, false).unwrap();
        let (evicted, _) = core.maintenance().unwrap();
        assert_eq!(evicted, 0);
        assert_eq!(core.read_sessions().unwrap().active_count(), 1);
    }

    #[test]
    fn log_goes_to_audit_buffer() {
        let core = test_core(Arc::new(MockLlmClient::new()));
        core.log(AuditEntry::new(AuditEvent::Login, AuditOutcome::Success, "/api/auth/session"));
        assert_eq!(core.audit().entries().len(), 1);
    }

    #[test]
    fn cookie_flag_follows_config() {
        let core = test_core(Arc::new(MockLlmClient::new()));
        assert!(!core.config.cookie_secure);
    }
}
