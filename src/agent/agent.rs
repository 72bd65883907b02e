//! Agent definition: instructions, tools, handoffs and guardrails.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::guardrail::{InputGuardrail, OutputGuardrail};
use crate::handoff::Handoff;
use crate::run::context::RunContext;
use crate::tools::Tool;
use crate::types::ModelSettings;

/// Instructions computed from the run context.
pub type InstructionsFn = Arc<dyn Fn(&RunContext, &Agent) -> String + Send + Sync>;

/// System instructions for an agent.
#[derive(Clone)]
pub enum Instructions {
    Static(String),
    Dynamic(InstructionsFn),
}

impl Default for Instructions {
    fn default() -> Self {
        Self::Static(String::new())
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// What happens after the agent's tool calls complete.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolUseBehavior {
    /// Send tool results back to the model.
    #[default]
    RunLlmAgain,
    /// Use the first tool result of the turn as the final output.
    StopOnFirstTool,
}

/// An agent: a bundle of instructions, tools and transfer targets.
///
/// Agents are immutable during a run. Handoffs name their target; the
/// [`super::AgentGraph`] resolves names to agents.
#[derive(Clone)]
pub struct Agent {
    pub name: String,
    pub instructions: Instructions,
    pub tools: Vec<Tool>,
    pub handoffs: Vec<Handoff>,
    pub input_guardrails: Vec<InputGuardrail>,
    pub output_guardrails: Vec<OutputGuardrail>,
    pub model_settings: ModelSettings,
    /// JSON Schema the final output must satisfy.
    pub output_schema: Option<serde_json::Value>,
    /// Shown to other agents' models on the transfer tool.
    pub handoff_description: Option<String>,
    pub tool_use_behavior: ToolUseBehavior,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Instructions::default(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            model_settings: ModelSettings::default(),
            output_schema: None,
            handoff_description: None,
            tool_use_behavior: ToolUseBehavior::default(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Instructions::Static(instructions.into());
        self
    }

    pub fn with_dynamic_instructions<F>(mut self, instructions: F) -> Self
    where
        F: Fn(&RunContext, &Agent) -> String + Send + Sync + 'static,
    {
        self.instructions = Instructions::Dynamic(Arc::new(instructions));
        self
    }

    pub fn with_tool(mut self, tool: impl Into<Tool>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn with_handoff(mut self, handoff: impl Into<Handoff>) -> Self {
        self.handoffs.push(handoff.into());
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: InputGuardrail) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: OutputGuardrail) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn with_tool_use_behavior(mut self, behavior: ToolUseBehavior) -> Self {
        self.tool_use_behavior = behavior;
        self
    }

    /// Instructions for the current run context.
    pub fn resolve_instructions(&self, ctx: &RunContext) -> String {
        match &self.instructions {
            Instructions::Static(text) => text.clone(),
            Instructions::Dynamic(f) => f(ctx, self),
        }
    }

    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("instructions", &self.instructions)
            .field("tools", &self.tools)
            .field(
                "handoffs",
                &self.handoffs.iter().map(|h| &h.target).collect::<Vec<_>>(),
            )
            .field("input_guardrails", &self.input_guardrails.len())
            .field("output_guardrails", &self.output_guardrails.len())
            .field("output_schema", &self.output_schema.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_instructions_see_context_and_agent() {
        let agent = Agent::new("support").with_dynamic_instructions(|ctx, agent| {
            format!("{} on turn {}", agent.name, ctx.turn)
        });
        let ctx = RunContext {
            turn: 2,
            ..RunContext::default()
        };

        assert_eq!(agent.resolve_instructions(&ctx), "support on turn 2");
    }

    #[test]
    fn static_instructions_are_returned_verbatim() {
        let agent = Agent::new("a").with_instructions("Be brief.");
        assert_eq!(agent.resolve_instructions(&RunContext::default()), "Be brief.");
    }
}
