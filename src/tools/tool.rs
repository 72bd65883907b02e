//! Tool kinds, handlers and approval requirements.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::ToolParameters;
use crate::error::Result;
use crate::guardrail::ToolGuardrail;
use crate::model::{ToolDefinition, ToolKind};

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub run_id: String,
    /// Agent that requested the call.
    pub agent: String,
    pub turn: usize,
    pub call_id: String,
    pub tool_name: String,
    /// Caller-supplied run metadata.
    pub metadata: serde_json::Value,
    /// Cancelled when the run is cancelled.
    pub cancel: CancellationToken,
}

/// Executes a local tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<serde_json::Value>;
}

type BoxedHandlerFn = dyn Fn(
        ToolArguments,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
    + Send
    + Sync;

/// Closure-based [`ToolHandler`].
pub struct FnHandler {
    handler: Arc<BoxedHandlerFn>,
}

impl FnHandler {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl ToolHandler for FnHandler {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<serde_json::Value> {
        (self.handler)(args, ctx).await
    }
}

/// Predicate deciding, per call, whether approval is needed.
pub type ApprovalPredicate = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

/// Whether a tool call must be approved before it runs.
#[derive(Clone, Default)]
pub enum ApprovalRequirement {
    #[default]
    Never,
    Always,
    /// Decided from the parsed arguments of each call.
    When(ApprovalPredicate),
}

impl ApprovalRequirement {
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
    {
        Self::When(Arc::new(predicate))
    }

    pub fn requires_approval(&self, args: &serde_json::Value) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::When(predicate) => predicate(args),
        }
    }
}

impl fmt::Debug for ApprovalRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::Always => f.write_str("Always"),
            Self::When(_) => f.write_str("When(..)"),
        }
    }
}

/// A function tool executed locally.
#[derive(Clone)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
    pub handler: Arc<dyn ToolHandler>,
    pub approval: ApprovalRequirement,
    /// Run over the parsed arguments before the handler.
    pub input_guardrails: Vec<ToolGuardrail>,
    /// Run over the raw handler result.
    pub output_guardrails: Vec<ToolGuardrail>,
}

impl FunctionTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self::with_handler(name, description, parameters, Arc::new(FnHandler::new(handler)))
    }

    pub fn with_handler(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
            approval: ApprovalRequirement::Never,
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
        }
    }

    pub fn with_approval(mut self, approval: ApprovalRequirement) -> Self {
        self.approval = approval;
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: ToolGuardrail) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: ToolGuardrail) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }
}

/// A tool executed by the model backend itself (web search, code
/// interpreter, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct HostedTool {
    pub name: String,
    pub description: String,
    /// Opaque configuration forwarded to the backend.
    pub config: serde_json::Value,
}

impl HostedTool {
    pub fn new(name: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            config,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Kind of device a [`DeviceTool`] drives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    Computer,
    Shell,
    Editor,
}

/// A tool that acts on the local machine. Requires approval unless
/// configured otherwise.
#[derive(Clone)]
pub struct DeviceTool {
    pub kind: DeviceKind,
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
    pub handler: Arc<dyn ToolHandler>,
    pub approval: ApprovalRequirement,
}

impl DeviceTool {
    /// Device tool named after its kind (`shell`, `editor`, `computer`).
    pub fn new(kind: DeviceKind, parameters: ToolParameters, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            kind,
            name: kind.to_string(),
            description: format!("Operate the local {kind}"),
            parameters,
            handler,
            approval: ApprovalRequirement::Always,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_approval(mut self, approval: ApprovalRequirement) -> Self {
        self.approval = approval;
        self
    }
}

/// A tool an agent can call.
#[derive(Clone)]
pub enum Tool {
    Function(FunctionTool),
    Hosted(HostedTool),
    Device(DeviceTool),
}

impl Tool {
    pub fn name(&self) -> &str {
        match self {
            Self::Function(t) => &t.name,
            Self::Hosted(t) => &t.name,
            Self::Device(t) => &t.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Function(t) => &t.description,
            Self::Hosted(t) => &t.description,
            Self::Device(t) => &t.description,
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Function(_) => ToolKind::Function,
            Self::Hosted(_) => ToolKind::Hosted,
            Self::Device(_) => ToolKind::Device,
        }
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self, Self::Hosted(_))
    }

    /// Backend-facing definition.
    pub fn definition(&self) -> ToolDefinition {
        match self {
            Self::Function(t) => ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.schema.clone(),
                kind: ToolKind::Function,
                config: None,
            },
            Self::Hosted(t) => ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: serde_json::Value::Null,
                kind: ToolKind::Hosted,
                config: Some(t.config.clone()),
            },
            Self::Device(t) => ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.schema.clone(),
                kind: ToolKind::Device,
                config: Some(serde_json::json!({ "device": t.kind })),
            },
        }
    }
}

impl From<FunctionTool> for Tool {
    fn from(tool: FunctionTool) -> Self {
        Self::Function(tool)
    }
}

impl From<HostedTool> for Tool {
    fn from(tool: HostedTool) -> Self {
        Self::Hosted(tool)
    }
}

impl From<DeviceTool> for Tool {
    fn from(tool: DeviceTool) -> Self {
        Self::Device(tool)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_handler() -> Arc<dyn ToolHandler> {
        Arc::new(FnHandler::new(|_args, _ctx| async { Ok(json!(null)) }))
    }

    #[test]
    fn device_tools_require_approval_by_default() {
        let tool = DeviceTool::new(DeviceKind::Shell, ToolParameters::empty(), noop_handler());

        assert_eq!(tool.name, "shell");
        assert!(tool.approval.requires_approval(&json!({})));
    }

    #[test]
    fn conditional_approval_uses_arguments() {
        let approval = ApprovalRequirement::when(|args| args["amount"].as_i64().unwrap_or(0) > 100);

        assert!(!approval.requires_approval(&json!({"amount": 5})));
        assert!(approval.requires_approval(&json!({"amount": 500})));
    }

    #[test]
    fn hosted_definition_carries_config() {
        let tool = Tool::from(HostedTool::new("web_search", json!({"region": "eu"})));
        let def = tool.definition();

        assert_eq!(def.kind, ToolKind::Hosted);
        assert_eq!(def.config, Some(json!({"region": "eu"})));
    }

    #[tokio::test]
    async fn closure_tools_receive_arguments_and_context() {
        let tool = FunctionTool::new(
            "echo",
            "Echo the input",
            ToolParameters::object().string("text", "Text", true).build(),
            |args, ctx| async move {
                Ok(json!({ "text": args.get_str("text")?, "call": ctx.call_id }))
            },
        );
        let ctx = ToolContext {
            call_id: "c1".into(),
            ..Default::default()
        };

        let out = tool
            .handler
            .call(ToolArguments::new(json!({"text": "hi"})), ctx)
            .await
            .unwrap();

        assert_eq!(out, json!({"text": "hi", "call": "c1"}));
    }
}
