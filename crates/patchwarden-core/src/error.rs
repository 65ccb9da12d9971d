//! Error types for Patchwarden Core
//!
//! Expected rejections (guardrail denials, failed agents, failed stages) are
//! modelled as values, not errors. The types here cover genuine faults:
//! misconfiguration, collaborator failures and I/O.

use thiserror::Error;

/// Result type alias for Patchwarden operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for Patchwarden core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Webhook secret absent while verification is enforced
    #[error("webhook secret is not configured and test mode is disabled")]
    MissingSecret,

    /// Configuration could not be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Agent-related errors
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// Repository collaborator errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parse errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by an agent collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("agent {0} is not registered")]
    NotRegistered(String),

    #[error("agent {agent} failed: {message}")]
    Failed { agent: String, message: String },

    #[error("agent {agent} timed out after {seconds}s")]
    TimedOut { agent: String, seconds: u64 },

    #[error("agent {0} panicked")]
    Panicked(String),
}

/// Failures reported by the repository collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("clone failed: {0}")]
    CloneFailed(String),

    #[error("patch could not be applied: {0}")]
    ApplyFailed(String),

    #[error("command failed to start: {0}")]
    CommandFailed(String),

    #[error("operation timed out after {0}s")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_errors_convert() {
        let err = CoreError::from(RepositoryError::Timeout(30));
        assert!(matches!(err, CoreError::Repository(RepositoryError::Timeout(30))));
        assert_eq!(err.to_string(), "Repository error: operation timed out after 30s");

        let err = CoreError::from(AgentError::NotRegistered("triager".into()));
        assert!(err.to_string().contains("triager"));
    }

    #[test]
    fn test_config_parse_errors_convert() {
        let err: CoreError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert!(err.to_string().starts_with("Config parse error"));
    }
}
