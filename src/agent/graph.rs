//! Validated set of agents connected by handoffs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::Agent;
use crate::error::{BatonError, Result};

/// Owns every agent a run may activate.
///
/// Handoffs may form cycles; they are resolved by name, so the graph holds no
/// reference cycles. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct AgentGraph {
    agents: Arc<HashMap<String, Agent>>,
    start: String,
}

/// Collects agents for an [`AgentGraph`].
#[derive(Default)]
pub struct AgentGraphBuilder {
    agents: Vec<Agent>,
}

impl AgentGraphBuilder {
    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    /// Validate and build with `start` as the starting agent.
    ///
    /// Fails when agent names repeat, the start agent or a handoff target is
    /// missing, or an agent declares the same tool name twice.
    pub fn build(self, start: impl Into<String>) -> Result<AgentGraph> {
        let start = start.into();
        let mut agents = HashMap::with_capacity(self.agents.len());
        for agent in self.agents {
            if agents.contains_key(&agent.name) {
                return Err(BatonError::Configuration(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
            agents.insert(agent.name.clone(), agent);
        }

        if !agents.contains_key(&start) {
            return Err(BatonError::AgentNotFound(start));
        }

        for agent in agents.values() {
            validate_agent(agent, &agents)?;
        }

        let graph = AgentGraph {
            agents: Arc::new(agents),
            start,
        };
        let reachable = graph.reachable_from(&graph.start);
        let mut unreachable: Vec<&str> = graph
            .agents
            .keys()
            .filter(|name| !reachable.contains(name.as_str()))
            .map(String::as_str)
            .collect();
        if !unreachable.is_empty() {
            unreachable.sort_unstable();
            tracing::debug!(
                start = %graph.start,
                unreachable = ?unreachable,
                "agents not reachable from start agent"
            );
        }
        Ok(graph)
    }
}

fn validate_agent(agent: &Agent, agents: &HashMap<String, Agent>) -> Result<()> {
    let mut names = HashSet::new();
    for tool in &agent.tools {
        if !names.insert(tool.name().to_string()) {
            return Err(BatonError::Configuration(format!(
                "agent '{}' declares tool '{}' more than once",
                agent.name,
                tool.name()
            )));
        }
    }
    for handoff in &agent.handoffs {
        if !agents.contains_key(&handoff.target) {
            return Err(BatonError::Configuration(format!(
                "agent '{}' hands off to unknown agent '{}'",
                agent.name, handoff.target
            )));
        }
        let tool_name = handoff.tool_name();
        if !names.insert(tool_name.clone()) {
            return Err(BatonError::Configuration(format!(
                "agent '{}' declares tool '{}' more than once",
                agent.name, tool_name
            )));
        }
    }
    Ok(())
}

impl AgentGraph {
    pub fn builder() -> AgentGraphBuilder {
        AgentGraphBuilder::default()
    }

    /// Graph with a single agent that has no handoffs.
    pub fn single(agent: Agent) -> Result<Self> {
        let name = agent.name.clone();
        Self::builder().agent(agent).build(name)
    }

    pub fn start_name(&self) -> &str {
        &self.start
    }

    pub fn start(&self) -> Result<&Agent> {
        self.get(&self.start)
    }

    pub fn get(&self, name: &str) -> Result<&Agent> {
        self.agents
            .get(name)
            .ok_or_else(|| BatonError::AgentNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn agent_names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    /// Names of all agents reachable from `from` through handoffs,
    /// including `from` itself.
    pub fn reachable_from(&self, from: &str) -> HashSet<&str> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        if let Some((name, _)) = self.agents.get_key_value(from) {
            seen.insert(name.as_str());
            queue.push_back(name.as_str());
        }
        while let Some(current) = queue.pop_front() {
            let Some(agent) = self.agents.get(current) else {
                continue;
            };
            for handoff in &agent.handoffs {
                if let Some((name, _)) = self.agents.get_key_value(&handoff.target) {
                    if seen.insert(name.as_str()) {
                        queue.push_back(name.as_str());
                    }
                }
            }
        }
        seen
    }

    pub fn is_reachable(&self, from: &str, to: &str) -> bool {
        self.reachable_from(from).contains(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FunctionTool, ToolParameters};
    use serde_json::json;

    fn tool(name: &str) -> FunctionTool {
        FunctionTool::new(name, "", ToolParameters::empty(), |_, _| async { Ok(json!(null)) })
    }

    #[test]
    fn cycles_are_allowed_and_reachability_follows_handoffs() {
        let graph = AgentGraph::builder()
            .agent(Agent::new("triage").with_handoff("billing"))
            .agent(Agent::new("billing").with_handoff("triage"))
            .agent(Agent::new("orphan"))
            .build("triage")
            .unwrap();

        assert!(graph.is_reachable("triage", "billing"));
        assert!(graph.is_reachable("billing", "triage"));
        assert!(!graph.is_reachable("triage", "orphan"));
    }

    #[test]
    fn unknown_handoff_target_is_rejected() {
        let err = AgentGraph::builder()
            .agent(Agent::new("a").with_handoff("ghost"))
            .build("a")
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn duplicate_tool_names_are_rejected() {
        let err = AgentGraph::single(Agent::new("a").with_tool(tool("x")).with_tool(tool("x")))
            .unwrap_err();
        assert!(matches!(err, BatonError::Configuration(_)));
    }

    #[test]
    fn missing_start_agent_is_not_found() {
        let err = AgentGraph::builder()
            .agent(Agent::new("a"))
            .build("b")
            .unwrap_err();
        assert!(matches!(err, BatonError::AgentNotFound(name) if name == "b"));
    }
}
