//! Error types for baton.

pub mod unified;

pub use unified::{ErrorCategory, ErrorCode};

use thiserror::Error;

/// Primary error type for all baton operations.
///
/// Every variant that can end a run carries enough context (turn, active
/// agent) to reproduce the failure.
#[derive(Error, Debug)]
pub enum BatonError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend error ({code:?}): {message}")]
    Backend {
        code: ErrorCode,
        message: String,
        retryable: bool,
    },

    #[error("Model stream went idle for {0}ms")]
    StreamIdleTimeout(u64),

    #[error("Run exceeded max turns ({max_turns}) at turn {turn} (agent '{agent}')")]
    MaxTurnsExceeded {
        max_turns: usize,
        turn: usize,
        agent: String,
    },

    #[error("Approval decision for unknown tool call '{call_id}' at turn {turn} (agent '{agent}')")]
    UnknownApproval {
        call_id: String,
        turn: usize,
        agent: String,
    },

    #[error("Agent '{0}' not found in agent graph")]
    AgentNotFound(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Guardrail '{name}' failed: {message}")]
    Guardrail { name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Run cancelled at turn {turn} (agent '{agent}')")]
    Cancelled { turn: usize, agent: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BatonError {
    /// Create a backend error, deriving retryability from the code.
    pub fn backend(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
            retryable: code.is_transient(),
        }
    }

    /// Create a backend error that is never retried.
    pub fn backend_fatal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument(_) => ErrorCategory::Validation,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Backend { .. } | Self::StreamIdleTimeout(_) => ErrorCategory::Backend,
            Self::MaxTurnsExceeded { .. }
            | Self::UnknownApproval { .. }
            | Self::AgentNotFound(_)
            | Self::InvalidState(_)
            | Self::Guardrail { .. } => ErrorCategory::Protocol,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Session(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Whether a backend integration may retry this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { retryable, .. } => *retryable,
            Self::StreamIdleTimeout(_) => true,
            _ => false,
        }
    }

    /// Whether this error ends a run. Validation failures are reported to the
    /// model as tool results instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidArgument(_))
    }

    /// Whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BatonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_retryability_follows_code() {
        assert!(BatonError::backend(ErrorCode::RateLimitExceeded, "slow down").is_retryable());
        assert!(!BatonError::backend(ErrorCode::InvalidRequest, "bad").is_retryable());
        assert!(!BatonError::backend_fatal(ErrorCode::ServerError, "boom").is_retryable());
    }

    #[test]
    fn protocol_errors_carry_context_in_message() {
        let err = BatonError::MaxTurnsExceeded {
            max_turns: 3,
            turn: 4,
            agent: "triage".to_string(),
        };

        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert_eq!(
            err.to_string(),
            "Run exceeded max turns (3) at turn 4 (agent 'triage')"
        );
    }

    #[test]
    fn cancellation_has_its_own_category() {
        let err = BatonError::Cancelled {
            turn: 1,
            agent: "a".to_string(),
        };
        assert!(err.is_cancelled());
        assert_eq!(err.category(), ErrorCategory::Cancelled);
    }
}
