//! Name resolution for an agent's tools and handoffs.

use std::collections::HashMap;

use thiserror::Error;

use super::Tool;
use crate::agent::{Agent, AgentGraph};
use crate::handoff::Handoff;
use crate::model::ToolDefinition;

/// What a tool name refers to.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedTool<'a> {
    Tool(&'a Tool),
    Handoff(&'a Handoff),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Tool '{name}' not found")]
pub struct ToolNotFound {
    pub name: String,
}

/// The tools and transfer tools visible to one agent.
pub struct ToolRegistry<'a> {
    agent: &'a Agent,
    graph: &'a AgentGraph,
    by_name: HashMap<String, ResolvedTool<'a>>,
}

impl<'a> ToolRegistry<'a> {
    pub fn for_agent(agent: &'a Agent, graph: &'a AgentGraph) -> Self {
        let mut by_name = HashMap::with_capacity(agent.tools.len() + agent.handoffs.len());
        for tool in &agent.tools {
            by_name.insert(tool.name().to_string(), ResolvedTool::Tool(tool));
        }
        for handoff in &agent.handoffs {
            by_name.insert(handoff.tool_name(), ResolvedTool::Handoff(handoff));
        }
        Self {
            agent,
            graph,
            by_name,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent.name
    }

    pub fn resolve(&self, name: &str) -> Result<ResolvedTool<'a>, ToolNotFound> {
        self.by_name.get(name).copied().ok_or_else(|| ToolNotFound {
            name: name.to_string(),
        })
    }

    /// Tool definitions in declaration order: tools first, then one transfer
    /// tool per handoff.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.agent
            .tools
            .iter()
            .map(Tool::definition)
            .chain(self.agent.handoffs.iter().map(|h| h.definition(self.graph)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolKind;
    use crate::tools::{FunctionTool, HostedTool, ToolParameters};
    use serde_json::json;

    fn graph() -> AgentGraph {
        let lookup = FunctionTool::new(
            "lookup",
            "Look things up",
            ToolParameters::empty(),
            |_, _| async { Ok(json!("found")) },
        );
        AgentGraph::builder()
            .agent(
                Agent::new("triage")
                    .with_tool(lookup)
                    .with_tool(HostedTool::new("web_search", json!({})))
                    .with_handoff("billing"),
            )
            .agent(Agent::new("billing").with_handoff_description("Invoices and refunds."))
            .build("triage")
            .unwrap()
    }

    #[test]
    fn resolves_tools_and_handoffs() {
        let graph = graph();
        let registry = ToolRegistry::for_agent(graph.get("triage").unwrap(), &graph);

        assert!(matches!(registry.resolve("lookup"), Ok(ResolvedTool::Tool(_))));
        assert!(matches!(
            registry.resolve("transfer_to_billing"),
            Ok(ResolvedTool::Handoff(h)) if h.target == "billing"
        ));
        assert_eq!(
            registry.resolve("nope").unwrap_err().to_string(),
            "Tool 'nope' not found"
        );
    }

    #[test]
    fn definitions_include_transfer_tools_with_target_description() {
        let graph = graph();
        let registry = ToolRegistry::for_agent(graph.get("triage").unwrap(), &graph);

        let defs = registry.definitions();

        let kinds: Vec<_> = defs.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![ToolKind::Function, ToolKind::Hosted, ToolKind::Handoff]);
        assert!(defs[2].description.contains("Invoices and refunds."));
    }
}
