//! Tagged outcome type used at handler and stage seams.
//!
//! Callers branch on the outcome kind instead of treating every
//! non-success as an error: a guardrail denial is `Rejected`, an
//! unexpected collaborator failure is `Faulted`.

use serde::{Deserialize, Serialize};

use crate::types::{RiskLevel, SecurityDecision};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The operation completed and produced a value
    Accepted { value: T },
    /// A policy refused the operation
    Rejected { reason: String, risk_level: RiskLevel },
    /// Something went wrong while executing
    Faulted { error: String },
}

impl<T> Outcome<T> {
    pub fn accepted(value: T) -> Self {
        Self::Accepted { value }
    }

    pub fn rejected(reason: impl Into<String>, risk_level: RiskLevel) -> Self {
        Self::Rejected {
            reason: reason.into(),
            risk_level,
        }
    }

    pub fn faulted(error: impl Into<String>) -> Self {
        Self::Faulted {
            error: error.into(),
        }
    }

    /// Build a rejection from a failed security decision
    pub fn from_decision(decision: &SecurityDecision) -> Self {
        Self::rejected(decision.reason.clone(), decision.risk_level)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted { .. })
    }

    /// Short label: `accepted`, `blocked` or `error`
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "blocked",
            Self::Faulted { .. } => "error",
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Accepted { value } => Outcome::Accepted { value: f(value) },
            Self::Rejected { reason, risk_level } => Outcome::Rejected { reason, risk_level },
            Self::Faulted { error } => Outcome::Faulted { error },
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Accepted { value } => Some(value),
            _ => None,
        }
    }
}

impl<T, E: std::fmt::Display> From<std::result::Result<T, E>> for Outcome<T> {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::accepted(value),
            Err(e) => Self::faulted(e.to_string()),
        }
    }
}
