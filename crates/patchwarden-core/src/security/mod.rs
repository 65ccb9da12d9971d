//! Security layer: delivery authentication and mutation guardrails

pub mod audit;
pub mod guardrails;
pub mod patterns;
pub mod signature;

pub use audit::{AuditAction, AuditDetails, AuditEntry, SecurityAuditor};
pub use guardrails::{FileOperation, GuardrailStats, RepositoryOperation, SecurityGuardrails};
pub use signature::{sign_payload, SignatureVerifier, SIGNATURE_PREFIX};
