// Error taxonomy for capability validation
//
// Fatal variants are surfaced to the caller and never cached. Everything a
// probe can run into is converted into a `validated = false` result by the
// runner and only ever logged.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// No extractor/probe pair is registered for this task type
    #[error("Unsupported task type: {task_type}")]
    UnsupportedTaskType { task_type: String },

    /// The request lacks the parameter the extractor needs, or it is malformed
    #[error("Invalid parameters for {task_type}: {reason}")]
    InvalidParameters { task_type: String, reason: String },

    #[error("Secret resolution failed: {reason}")]
    SecretResolutionFailure { reason: String },

    #[error("Probe for '{criteria}' timed out after {timeout_ms}ms")]
    ProbeTimeout { criteria: String, timeout_ms: u64 },

    #[error("Network error probing '{criteria}': {reason}")]
    ProbeNetworkError { criteria: String, reason: String },

    #[error("Authentication rejected probing '{criteria}': {reason}")]
    ProbeAuthError { criteria: String, reason: String },

    #[error("Validation cancelled")]
    Cancelled,

    /// Raised by the dispatch layer when nobody can reach a dependency
    #[error("No reachable agent for dependency {}", .criteria.join(", "))]
    NoReachableAgent { criteria: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CapabilityError {
    pub fn unsupported(task_type: impl std::fmt::Display) -> Self {
        CapabilityError::UnsupportedTaskType {
            task_type: task_type.to_string(),
        }
    }

    pub fn invalid_parameters(task_type: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        CapabilityError::InvalidParameters {
            task_type: task_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Fatal errors abort a validation before any probe runs
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CapabilityError::UnsupportedTaskType { .. }
                | CapabilityError::InvalidParameters { .. }
                | CapabilityError::Config(_)
        )
    }

    /// Short machine-friendly label used in structured logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CapabilityError::UnsupportedTaskType { .. } => "unsupported_task_type",
            CapabilityError::InvalidParameters { .. } => "invalid_parameters",
            CapabilityError::SecretResolutionFailure { .. } => "secret_resolution_failure",
            CapabilityError::ProbeTimeout { .. } => "probe_timeout",
            CapabilityError::ProbeNetworkError { .. } => "probe_network_error",
            CapabilityError::ProbeAuthError { .. } => "probe_auth_error",
            CapabilityError::Cancelled => "cancelled",
            CapabilityError::NoReachableAgent { .. } => "no_reachable_agent",
            CapabilityError::Config(_) => "config",
            CapabilityError::Storage(_) => "storage",
        }
    }
}
