//! Bounded security audit log

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::RiskLevel;

/// Guardrail action that produced an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    FileAccess,
    Command,
    Patch,
    RepositoryAccess,
}

/// Security audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub details: AuditDetails,
}

/// What was checked and what was decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDetails {
    /// Path, command, url or patch digest that was checked
    pub target: String,
    pub valid: bool,
    pub reason: String,
    pub risk_level: RiskLevel,
}

/// Ring buffer keeping the most recent `capacity` entries
#[derive(Debug)]
pub struct SecurityAuditor {
    entries: RwLock<VecDeque<AuditEntry>>,
    max_entries: usize,
}

impl SecurityAuditor {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries,
        }
    }

    /// Log an audit event
    pub fn log(&self, action: AuditAction, details: AuditDetails) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            action,
            details,
        };

        let mut entries = self.entries.write();
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Most recent entries, newest first
    pub fn recent(&self, count: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read();
        entries.iter().rev().take(count).cloned().collect()
    }

    /// All retained entries, oldest first
    pub fn all(&self) -> Vec<AuditEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}
