//! Compliance audit trail for security and medical-data events.
//!
//! Entries are buffered in memory, mirrored to `tracing` on the `audit`
//! target, and flushed to SQLite when the buffer fills or on a timer.
//! Flushed entries older than 90 days are pruned.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::models::{AuditEvent, AuditOutcome};

/// Maximum audit buffer size before flush.
const AUDIT_BUFFER_CAPACITY: usize = 100;

/// Upper bound for the buffer when no database is configured.
const MEMORY_ONLY_CAPACITY: usize = 10_000;

pub const AUDIT_RETENTION_DAYS: i64 = 90;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Audit database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit buffer lock poisoned")]
    LockPoisoned,

    #[error("Corrupt audit row: {0}")]
    CorruptRow(String),
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub outcome: AuditOutcome,
    pub user_id: Option<String>,
    pub resource: String,
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(event: AuditEvent, outcome: AuditOutcome, resource: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            outcome,
            user_id: None,
            resource: resource.into(),
            detail: None,
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub struct AuditLogger {
    buffer: Mutex<Vec<AuditEntry>>,
    db_path: Option<PathBuf>,
}

impl AuditLogger {
    /// Logger persisting to a SQLite file. Creates the schema if needed.
    pub fn with_database(db_path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        init_schema(&conn)?;
        Ok(Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
            db_path: Some(db_path.to_path_buf()),
        })
    }

    /// Logger that keeps entries in memory only.
    pub fn in_memory() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
            db_path: None,
        }
    }

    /// Record an event. Auto-flushes when the buffer is full.
    pub fn log(&self, entry: AuditEntry) {
        tracing::info!(
            target: "audit",
            event = entry.event.as_str(),
            outcome = entry.outcome.as_str(),
            user_id = entry.user_id.as_deref().unwrap_or("-"),
            resource = %entry.resource,
            detail = entry.detail.as_deref().unwrap_or(""),
        );

        let needs_flush = match self.buffer.lock() {
            Ok(mut buf) => {
                buf.push(entry);
                if self.db_path.is_none() && buf.len() > MEMORY_ONLY_CAPACITY {
                    let excess = buf.len() - MEMORY_ONLY_CAPACITY;
                    buf.drain(..excess);
                }
                buf.len() >= AUDIT_BUFFER_CAPACITY
            }
            Err(_) => {
                tracing::error!("Audit buffer lock poisoned; entry dropped");
                false
            }
        };

        if needs_flush && self.db_path.is_some() {
            if let Err(e) = self.flush() {
                tracing::warn!("Auto-flush audit failed: {e}");
            }
        }
    }

    /// Current buffer contents.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    /// Flush buffered entries to SQLite and prune old entries.
    /// Without a database this is a no-op.
    pub fn flush(&self) -> Result<usize, AuditError> {
        let Some(path) = &self.db_path else {
            return Ok(0);
        };

        let entries: Vec<AuditEntry> = {
            let mut buf = self.buffer.lock().map_err(|_| AuditError::LockPoisoned)?;
            buf.drain(..).collect()
        };
        if entries.is_empty() {
            return Ok(0);
        }

        let conn = match insert_entries(path, &entries) {
            Ok(conn) => conn,
            Err(e) => {
                // Put the batch back ahead of anything logged meanwhile.
                if let Ok(mut buf) = self.buffer.lock() {
                    let newer = std::mem::replace(&mut *buf, entries);
                    buf.extend(newer);
                }
                return Err(e);
            }
        };

        let cutoff = (Utc::now() - Duration::days(AUDIT_RETENTION_DAYS)).to_rfc3339();
        match conn.execute("DELETE FROM audit_log WHERE timestamp < ?1", params![cutoff]) {
            Ok(pruned) if pruned > 0 => tracing::debug!(pruned, "Pruned old audit entries"),
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to prune audit log: {e}"),
        }

        tracing::debug!(count = entries.len(), "Flushed audit entries to database");
        Ok(entries.len())
    }

    /// Newest entries first, from the buffer and then the database.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let mut out: Vec<AuditEntry> = {
            let buf = self.buffer.lock().map_err(|_| AuditError::LockPoisoned)?;
            buf.iter().rev().take(limit).cloned().collect()
        };

        if out.len() < limit {
            if let Some(path) = &self.db_path {
                let conn = Connection::open(path)?;
                out.extend(query_recent(&conn, limit - out.len())?);
            }
        }
        Ok(out)
    }
}

/// Insert a batch in one transaction; nothing is written unless all rows are.
fn insert_entries(path: &Path, entries: &[AuditEntry]) -> Result<Connection, AuditError> {
    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO audit_log (timestamp, event, outcome, user_id, resource, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for e in entries {
            stmt.execute(params![
                e.timestamp.to_rfc3339(),
                e.event.as_str(),
                e.outcome.as_str(),
                e.user_id,
                e.resource,
                e.detail,
            ])?;
        }
    }
    tx.commit()?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), AuditError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            event TEXT NOT NULL,
            outcome TEXT NOT NULL,
            user_id TEXT,
            resource TEXT NOT NULL,
            detail TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log (timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log (user_id);",
    )?;
    Ok(())
}

fn query_recent(conn: &Connection, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, event, outcome, user_id, resource, detail
         FROM audit_log ORDER BY timestamp DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (timestamp, event, outcome, user_id, resource, detail) = row?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| AuditError::CorruptRow(e.to_string()))?
            .with_timezone(&Utc);
        entries.push(AuditEntry {
            timestamp,
            event: event
                .parse()
                .map_err(|e: crate::models::ValidationError| AuditError::CorruptRow(e.to_string()))?,
            outcome: outcome
                .parse()
                .map_err(|e: crate::models::ValidationError| AuditError::CorruptRow(e.to_string()))?,
            user_id,
            resource,
            detail,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(user: &str) -> AuditEntry {
        AuditEntry::new(AuditEvent::Login, AuditOutcome::Success, "POST /api/auth/session")
            .user(user)
    }

    #[test]
    fn in_memory_logger_buffers_entries() {
        let logger = AuditLogger::in_memory();
        logger.log(login("user-1"));
        logger.log(
            AuditEntry::new(AuditEvent::AuthFailure, AuditOutcome::Failure, "GET /api/auth/me")
                .detail("missing session cookie"),
        );
        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user_id.as_deref(), Some("user-1"));
        assert_eq!(entries[1].detail.as_deref(), Some("missing session cookie"));
        assert_eq!(logger.flush().unwrap(), 0);
        assert_eq!(logger.buffer_len(), 2);
    }

    #[test]
    fn recent_returns_newest_first() {
        let logger = AuditLogger::in_memory();
        logger.log(login("first"));
        logger.log(login("second"));
        let recent = logger.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].user_id.as_deref(), Some("second"));
    }

    #[test]
    fn flush_persists_to_sqlite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("audit.db");
        let logger = AuditLogger::with_database(&path).unwrap();

        logger.log(login("user-1"));
        logger.log(
            AuditEntry::new(
                AuditEvent::EmergencyDetected,
                AuditOutcome::Success,
                "POST /api/assessment",
            )
            .user("user-1")
            .detail("CARD-001"),
        );
        assert_eq!(logger.flush().unwrap(), 2);
        assert_eq!(logger.buffer_len(), 0);

        let recent = logger.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent
            .iter()
            .any(|e| e.event == AuditEvent::EmergencyDetected && e.detail.as_deref() == Some("CARD-001")));
    }

    #[test]
    fn failed_flush_keeps_entries_buffered() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("audit.db");
        let logger = AuditLogger::with_database(&path).unwrap();
        logger.log(login("first"));

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(logger.flush().is_err());
        assert_eq!(logger.buffer_len(), 1);

        logger.log(login("second"));
        let users: Vec<_> = logger
            .entries()
            .into_iter()
            .filter_map(|e| e.user_id)
            .collect();
        assert_eq!(users, vec!["first", "second"]);

        std::fs::remove_dir(&path).unwrap();
        let conn = Connection::open(&path).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(logger.flush().unwrap(), 2);
        assert_eq!(logger.buffer_len(), 0);
    }

    #[test]
    fn full_buffer_auto_flushes() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = AuditLogger::with_database(&tmp.path().join("audit.db")).unwrap();
        for i in 0..AUDIT_BUFFER_CAPACITY {
            logger.log(login(&format!("user-{i}")));
        }
        assert_eq!(logger.buffer_len(), 0);
        assert_eq!(logger.recent(500).unwrap().len(), AUDIT_BUFFER_CAPACITY);
    }

    #[test]
    fn flush_prunes_entries_past_retention() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("audit.db");
        let logger = AuditLogger::with_database(&path).unwrap();

        let mut old = login("old-user");
        old.timestamp = Utc::now() - Duration::days(AUDIT_RETENTION_DAYS + 1);
        logger.log(old);
        logger.log(login("new-user"));
        logger.flush().unwrap();

        let recent = logger.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].user_id.as_deref(), Some("new-user"));
    }
}
