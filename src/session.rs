//! Server-side session records for the patient portal.
//!
//! Sessions live only in process memory and are keyed by an opaque
//! session id that the browser holds in a cookie. Each session is
//! paired with a refresh token; only the SHA-256 hash of the refresh
//! token is kept. Refreshing rotates both values.
//!
//! Lifetimes:
//! - access window: 8 hours (30 days with remember-me)
//! - refresh window: 24 hours (30 days with remember-me)
//! - idle timeout: 30 minutes, not applied to remember-me sessions

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use zeroize::Zeroizing;

use crate::models::{Permission, Role};

pub const MAX_SESSIONS_PER_USER: usize = 5;
const MAX_USER_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,
    #[error("Session expired")]
    Expired,
    #[error("Session closed after inactivity")]
    IdleTimeout,
    #[error("Refresh token invalid")]
    InvalidRefreshToken,
    #[error("Refresh token expired")]
    RefreshExpired,
    #[error("Invalid user id")]
    InvalidUser,
}

/// Tunable lifetimes. `Default` carries the production values.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub remember_me_ttl: Duration,
    pub idle_timeout: Duration,
    pub max_per_user: usize,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::hours(8),
            refresh_ttl: Duration::hours(24),
            remember_me_ttl: Duration::days(30),
            idle_timeout: Duration::minutes(30),
            max_per_user: MAX_SESSIONS_PER_USER,
        }
    }
}

impl SessionPolicy {
    fn lifetimes(&self, remember_me: bool) -> (Duration, Duration) {
        if remember_me {
            (self.remember_me_ttl, self.remember_me_ttl)
        } else {
            (self.access_ttl, self.refresh_ttl)
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Public views
// ═══════════════════════════════════════════════════════════

/// Authenticated session as seen by handlers.
#[derive(Debug, Clone, Serialize)]
pub struct HealthcareSession {
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remember_me: bool,
}

impl HealthcareSession {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Seconds until the access window closes (0 when already past).
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// A freshly issued or rotated session, including the raw refresh token.
/// The raw token exists only here, long enough to be written to a cookie.
#[derive(Debug)]
pub struct IssuedSession {
    pub session: HealthcareSession,
    pub refresh_token: Zeroizing<String>,
    pub refresh_expires_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════
// Internal record
// ═══════════════════════════════════════════════════════════

struct SessionRecord {
    user_id: String,
    role: Role,
    remember_me: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    refresh_expires_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    refresh_hash: [u8; 32],
}

impl SessionRecord {
    fn view(&self, session_id: &str) -> HealthcareSession {
        HealthcareSession {
            session_id: session_id.to_string(),
            user_id: self.user_id.clone(),
            role: self.role,
            permissions: self.role.permissions(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            remember_me: self.remember_me,
        }
    }

    fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        !self.remember_me && now - self.last_activity > idle_timeout
    }
}

// ═══════════════════════════════════════════════════════════
// SessionManager
// ═══════════════════════════════════════════════════════════

pub struct SessionManager {
    sessions: HashMap<String, SessionRecord>,
    /// refresh-token hash → session id
    refresh_index: HashMap<[u8; 32], String>,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_policy(SessionPolicy::default())
    }

    pub fn with_policy(policy: SessionPolicy) -> Self {
        Self {
            sessions: HashMap::new(),
            refresh_index: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    // ── Issue ────────────────────────────────────────────

    pub fn create(
        &mut self,
        user_id: &str,
        role: Role,
        remember_me: bool,
    ) -> Result<IssuedSession, SessionError> {
        self.create_at(user_id, role, remember_me, Utc::now())
    }

    pub(crate) fn create_at(
        &mut self,
        user_id: &str,
        role: Role,
        remember_me: bool,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, SessionError> {
        let user_id = user_id.trim();
        if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
            return Err(SessionError::InvalidUser);
        }

        self.enforce_user_limit(user_id);

        let (access_ttl, refresh_ttl) = self.policy.lifetimes(remember_me);
        let record = SessionRecord {
            user_id: user_id.to_string(),
            role,
            remember_me,
            created_at: now,
            expires_at: now + access_ttl,
            refresh_expires_at: now + refresh_ttl,
            last_activity: now,
            refresh_hash: [0; 32],
        };

        let issued = self.insert(record);
        tracing::debug!(user_id, role = %role, remember_me, "Session created");
        Ok(issued)
    }

    /// Store a record under fresh credentials.
    fn insert(&mut self, mut record: SessionRecord) -> IssuedSession {
        let session_id = generate_token();
        let refresh_token = Zeroizing::new(generate_token());
        record.refresh_hash = hash_token(&refresh_token);

        let issued = IssuedSession {
            session: record.view(&session_id),
            refresh_token,
            refresh_expires_at: record.refresh_expires_at,
        };

        self.refresh_index
            .insert(record.refresh_hash, session_id.clone());
        self.sessions.insert(session_id, record);
        issued
    }

    /// Evict the user's oldest sessions so a new one fits under the cap.
    fn enforce_user_limit(&mut self, user_id: &str) {
        let mut owned: Vec<(String, DateTime<Utc>)> = self
            .sessions
            .iter()
            .filter(|(_, r)| r.user_id == user_id)
            .map(|(id, r)| (id.clone(), r.created_at))
            .collect();

        if owned.len() < self.policy.max_per_user {
            return;
        }

        owned.sort_by_key(|(_, created)| *created);
        let excess = owned.len() + 1 - self.policy.max_per_user;
        for (id, _) in owned.into_iter().take(excess) {
            tracing::info!(user_id, "Evicting oldest session (per-user limit)");
            self.remove(&id);
        }
    }

    // ── Validate ─────────────────────────────────────────

    pub fn validate(&mut self, session_id: &str) -> Result<HealthcareSession, SessionError> {
        self.validate_at(session_id, Utc::now())
    }

    pub(crate) fn validate_at(
        &mut self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<HealthcareSession, SessionError> {
        let (refresh_dead, access_expired, idle) = {
            let record = self.sessions.get(session_id).ok_or(SessionError::NotFound)?;
            (
                now >= record.refresh_expires_at,
                now >= record.expires_at,
                record.is_idle(now, self.policy.idle_timeout),
            )
        };

        if refresh_dead {
            self.remove(session_id);
            return Err(SessionError::Expired);
        }
        if idle {
            // Idle sessions are closed outright; refresh must not revive them.
            self.remove(session_id);
            return Err(SessionError::IdleTimeout);
        }
        if access_expired {
            return Err(SessionError::Expired);
        }

        let record = self
            .sessions
            .get_mut(session_id)
            .ok_or(SessionError::NotFound)?;
        record.last_activity = now;
        Ok(record.view(session_id))
    }

    // ── Refresh ──────────────────────────────────────────

    /// Rotate the session id and refresh token. The old pair stops working.
    pub fn refresh(&mut self, refresh_token: &str) -> Result<IssuedSession, SessionError> {
        self.refresh_at(refresh_token, Utc::now())
    }

    pub(crate) fn refresh_at(
        &mut self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, SessionError> {
        let hash = hash_token(refresh_token);
        let old_id = self
            .refresh_index
            .remove(&hash)
            .ok_or(SessionError::InvalidRefreshToken)?;
        let mut record = self
            .sessions
            .remove(&old_id)
            .ok_or(SessionError::InvalidRefreshToken)?;

        if now >= record.refresh_expires_at {
            tracing::debug!(user_id = %record.user_id, "Refresh token expired");
            return Err(SessionError::RefreshExpired);
        }
        if record.is_idle(now, self.policy.idle_timeout) {
            return Err(SessionError::IdleTimeout);
        }

        let (access_ttl, refresh_ttl) = self.policy.lifetimes(record.remember_me);
        record.expires_at = now + access_ttl;
        record.refresh_expires_at = now + refresh_ttl;
        record.last_activity = now;

        let issued = self.insert(record);
        tracing::debug!(user_id = %issued.session.user_id, "Session rotated");
        Ok(issued)
    }

    // ── Revoke / housekeeping ────────────────────────────

    pub fn revoke(&mut self, session_id: &str) -> bool {
        self.remove(session_id)
    }

    /// Revoke every session belonging to a user. Returns how many were removed.
    pub fn revoke_user(&mut self, user_id: &str) -> usize {
        let ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, r)| r.user_id == user_id)
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter().filter(|id| self.remove(id)).count()
    }

    pub fn cleanup_expired(&mut self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub(crate) fn cleanup_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let idle_timeout = self.policy.idle_timeout;
        let dead: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, r)| now >= r.refresh_expires_at || r.is_idle(now, idle_timeout))
            .map(|(id, _)| id.clone())
            .collect();
        dead.iter().filter(|id| self.remove(id)).count()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions_for_user(&self, user_id: &str) -> Vec<HealthcareSession> {
        let mut sessions: Vec<HealthcareSession> = self
            .sessions
            .iter()
            .filter(|(_, r)| r.user_id == user_id)
            .map(|(id, r)| r.view(id))
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    fn remove(&mut self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some(record) => {
                self.refresh_index.remove(&record.refresh_hash);
                true
            }
            None => false,
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Token helpers
// ═══════════════════════════════════════════════════════════

/// Hash a token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn create_then_validate() {
        let mut mgr = SessionManager::new();
        let now = t0();
        let issued = mgr.create_at("user-1", Role::Patient, false, now).unwrap();

        let session = mgr
            .validate_at(&issued.session.session_id, now + Duration::minutes(1))
            .unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.role, Role::Patient);
        assert!(session.has_permission(Permission::SubmitSymptoms));
        assert!(!session.has_permission(Permission::ViewAuditLog));
        assert_eq!(session.expires_at, now + Duration::hours(8));
    }

    #[test]
    fn unknown_session_not_found() {
        let mut mgr = SessionManager::new();
        assert_eq!(mgr.validate("nope").unwrap_err(), SessionError::NotFound);
    }

    #[test]
    fn empty_user_id_rejected() {
        let mut mgr = SessionManager::new();
        assert_eq!(
            mgr.create("   ", Role::Patient, false).unwrap_err(),
            SessionError::InvalidUser
        );
    }

    #[test]
    fn refresh_token_stored_hashed() {
        let mut mgr = SessionManager::new();
        let issued = mgr.create("user-1", Role::Patient, false).unwrap();
        let record = mgr.sessions.get(&issued.session.session_id).unwrap();
        assert_eq!(record.refresh_hash, hash_token(&issued.refresh_token));
        assert_ne!(&record.refresh_hash[..], issued.refresh_token.as_bytes());
    }

    #[test]
    fn access_expiry_keeps_record_for_refresh() {
        let mut mgr = SessionManager::new();
        let now = t0();
        let issued = mgr.create_at("user-1", Role::Patient, false, now).unwrap();
        let id = issued.session.session_id.clone();

        // Keep the session active so the idle timeout does not fire.
        let mut t = now;
        while t + Duration::minutes(20) < now + Duration::hours(8) {
            t += Duration::minutes(20);
            mgr.validate_at(&id, t).unwrap();
        }

        let later = now + Duration::hours(8) + Duration::minutes(1);
        assert_eq!(mgr.validate_at(&id, later).unwrap_err(), SessionError::Expired);
        assert_eq!(mgr.active_count(), 1);

        let rotated = mgr.refresh_at(&issued.refresh_token, later).unwrap();
        assert_ne!(rotated.session.session_id, id);
        assert!(mgr
            .validate_at(&rotated.session.session_id, later + Duration::minutes(1))
            .is_ok());
    }

    #[test]
    fn idle_session_closed() {
        let mut mgr = SessionManager::new();
        let now = t0();
        let issued = mgr.create_at("user-1", Role::Patient, false, now).unwrap();
        let id = issued.session.session_id.clone();

        let err = mgr.validate_at(&id, now + Duration::minutes(31)).unwrap_err();
        assert_eq!(err, SessionError::IdleTimeout);
        assert_eq!(mgr.active_count(), 0);
        // Refresh cannot revive an idle-closed session
        assert_eq!(
            mgr.refresh_at(&issued.refresh_token, now + Duration::minutes(32))
                .unwrap_err(),
            SessionError::InvalidRefreshToken
        );
    }

    #[test]
    fn remember_me_skips_idle_timeout_and_lasts_thirty_days() {
        let mut mgr = SessionManager::new();
        let now = t0();
        let issued = mgr.create_at("user-1", Role::Patient, true, now).unwrap();
        assert_eq!(issued.session.expires_at, now + Duration::days(30));
        assert_eq!(issued.refresh_expires_at, now + Duration::days(30));

        let id = issued.session.session_id;
        assert!(mgr.validate_at(&id, now + Duration::days(3)).is_ok());
    }

    #[test]
    fn refresh_rotates_and_invalidates_old_pair() {
        let mut mgr = SessionManager::new();
        let now = t0();
        let issued = mgr.create_at("user-1", Role::Doctor, false, now).unwrap();
        let old_id = issued.session.session_id.clone();

        let rotated = mgr
            .refresh_at(&issued.refresh_token, now + Duration::minutes(5))
            .unwrap();
        assert_ne!(rotated.refresh_token.as_str(), issued.refresh_token.as_str());
        assert_eq!(rotated.session.role, Role::Doctor);

        assert_eq!(
            mgr.validate_at(&old_id, now + Duration::minutes(6)).unwrap_err(),
            SessionError::NotFound
        );
        assert_eq!(
            mgr.refresh_at(&issued.refresh_token, now + Duration::minutes(6))
                .unwrap_err(),
            SessionError::InvalidRefreshToken
        );
    }

    #[test]
    fn expired_refresh_token_removes_session() {
        let policy = SessionPolicy {
            idle_timeout: Duration::days(2),
            ..SessionPolicy::default()
        };
        let mut mgr = SessionManager::with_policy(policy);
        let now = t0();
        let issued = mgr.create_at("user-1", Role::Patient, false, now).unwrap();

        let err = mgr
            .refresh_at(&issued.refresh_token, now + Duration::hours(25))
            .unwrap_err();
        assert_eq!(err, SessionError::RefreshExpired);
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn revoke_removes_session() {
        let mut mgr = SessionManager::new();
        let issued = mgr.create("user-1", Role::Patient, false).unwrap();
        assert!(mgr.revoke(&issued.session.session_id));
        assert!(!mgr.revoke(&issued.session.session_id));
        assert!(mgr.refresh(&issued.refresh_token).is_err());
    }

    #[test]
    fn revoke_user_removes_all_their_sessions() {
        let mut mgr = SessionManager::new();
        mgr.create("user-1", Role::Patient, false).unwrap();
        mgr.create("user-1", Role::Patient, true).unwrap();
        mgr.create("user-2", Role::Patient, false).unwrap();

        assert_eq!(mgr.revoke_user("user-1"), 2);
        assert_eq!(mgr.active_count(), 1);
        assert_eq!(mgr.sessions_for_user("user-2").len(), 1);
    }

    #[test]
    fn per_user_limit_evicts_oldest() {
        let mut mgr = SessionManager::new();
        let now = t0();
        let first = mgr.create_at("user-1", Role::Patient, false, now).unwrap();
        for i in 1..=MAX_SESSIONS_PER_USER {
            mgr.create_at("user-1", Role::Patient, false, now + Duration::seconds(i as i64))
                .unwrap();
        }
        assert_eq!(mgr.sessions_for_user("user-1").len(), MAX_SESSIONS_PER_USER);
        assert_eq!(
            mgr.validate_at(&first.session.session_id, now + Duration::minutes(1))
                .unwrap_err(),
            SessionError::NotFound
        );
    }

    #[test]
    fn cleanup_removes_dead_sessions_only() {
        let mut mgr = SessionManager::new();
        let now = t0();
        mgr.create_at("user-1", Role::Patient, false, now).unwrap();
        mgr.create_at("user-2", Role::Patient, true, now).unwrap();

        let removed = mgr.cleanup_expired_at(now + Duration::hours(2));
        assert_eq!(removed, 1); // idle, not remember-me
        assert_eq!(mgr.active_count(), 1);
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
        assert_eq!(t1.len(), 43);
    }

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(hash_token("test"), hash_token("test"));
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }
}
