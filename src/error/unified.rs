//! Unified error classification.

use serde::{Deserialize, Serialize};

/// Machine-readable code reported by a model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    RateLimitExceeded,
    ContextLengthExceeded,
    ContentFiltered,
    MalformedResponse,
    ServerError,
    ServiceUnavailable,
    Timeout,
    NetworkError,
    Unknown,
}

impl ErrorCode {
    /// Codes a backend integration may reasonably retry.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded
                | Self::ServerError
                | Self::ServiceUnavailable
                | Self::Timeout
                | Self::NetworkError
        )
    }
}

/// Broad error category, mirroring the run error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad tool arguments or malformed model output. Normally recovered
    /// inside the run and never surfaced.
    Validation,
    /// A tool handler failed and the run was configured to treat that as fatal.
    ToolExecution,
    /// The model backend failed.
    Backend,
    /// The run violated its own protocol (turn limit, unknown approval id, ...).
    Protocol,
    /// The caller cancelled the run.
    Cancelled,
    Configuration,
    Storage,
    Serialization,
}
