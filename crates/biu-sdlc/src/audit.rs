//! Audit trail of link traffic
//!
//! One [`AuditRecord`] per read, write or error on the serial connection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Kind of audited event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditAction {
    /// Bytes received
    #[serde(rename = "r")]
    Read,
    /// Bytes written
    #[serde(rename = "w")]
    Write,
    /// Link failure
    #[serde(rename = "e")]
    Error,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditAction::Read => "r",
            AuditAction::Write => "w",
            AuditAction::Error => "e",
        })
    }
}

/// One audited link event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    /// Time the event was recorded
    pub at: DateTime<Utc>,
    /// Read, write or error
    pub action: AuditAction,
    /// Lowercase hex of the bytes, or the error text
    pub detail: String,
}

impl AuditRecord {
    /// Record stamped with the current time
    pub fn now(action: AuditAction, detail: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            action,
            detail: detail.into(),
        }
    }
}

/// Receives audit records
pub trait AuditSink: Send + Sync {
    /// Store or emit one record
    fn record(&self, record: AuditRecord);
}

/// Emits records as `tracing` events on the `biu_sdlc::audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, record: AuditRecord) {
        tracing::trace!(
            target: "biu_sdlc::audit",
            at = %record.at.to_rfc3339(),
            action = %record.action,
            detail = %record.detail,
            "SDLC audit"
        );
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryAudit {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAudit {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record, oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, record: AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
