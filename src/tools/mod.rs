//! Tool system: definitions, argument handling, validation and execution.

pub mod arguments;
pub mod executor;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use executor::{error_result, PreparedCall, ToolExecutor, ToolOutcome};
pub use registry::{ResolvedTool, ToolNotFound, ToolRegistry};
pub use tool::{
    ApprovalRequirement, DeviceKind, DeviceTool, FnHandler, FunctionTool, HostedTool, Tool,
    ToolContext, ToolHandler,
};
pub use types::{ApprovalDecision, ParameterBuilder, ToolParameters};
pub use validation::validate_arguments;
