//! Convenience re-exports for common use.

pub use crate::agent::{Agent, AgentGraph, ToolUseBehavior};
pub use crate::config::{CompactionConfig, RunConfig};
pub use crate::error::{BatonError, ErrorCategory, ErrorCode, Result};
pub use crate::guardrail::{
    input_guardrail, output_guardrail, tool_guardrail, GuardrailResult, PatternGuardrail,
};
pub use crate::handoff::Handoff;
pub use crate::model::{ModelBackend, ModelRequest, RetryPolicy, RetryingBackend, ScriptedBackend};
pub use crate::run::{RunOptions, RunResult, RunState, RunStatus, Runner};
pub use crate::session::{CompactingSession, FileSession, MemorySession, Session};
pub use crate::tools::{
    ApprovalDecision, ApprovalRequirement, FunctionTool, ParameterBuilder, Tool, ToolArguments,
    ToolParameters,
};
pub use crate::types::{Item, ModelResponse, ModelSettings, Usage};
