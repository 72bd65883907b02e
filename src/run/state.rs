//! Serializable run snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::agent::AgentGraph;
use crate::error::{BatonError, Result};
use crate::tools::ApprovalDecision;
use crate::types::{Item, ToolCallItem, Usage};

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Running,
    NeedsApproval,
    Completed,
    Errored,
}

/// A tool call waiting for a human decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingApproval {
    pub call: ToolCallItem,
    /// Agent whose tool set owns the call.
    pub agent: String,
    /// The call's result ends the run (first call of a stop-on-first-tool turn).
    #[serde(default)]
    pub final_candidate: bool,
}

impl PendingApproval {
    pub fn call_id(&self) -> &str {
        &self.call.call_id
    }

    pub fn tool_name(&self) -> &str {
        &self.call.name
    }
}

/// Everything needed to continue a run, possibly in another process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub run_id: String,
    pub starting_agent: String,
    pub active_agent: String,
    /// Session items loaded when the run started.
    pub history: Vec<Item>,
    /// Items the active agent sees.
    pub context: Vec<Item>,
    /// Items produced by this run, committed on completion.
    pub new_items: Vec<Item>,
    pub current_turn: usize,
    pub max_turns: usize,
    pub status: RunStatus,
    pub pending_approvals: Vec<PendingApproval>,
    #[serde(default)]
    pub approvals: BTreeMap<String, ApprovalDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_final: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(
        run_id: impl Into<String>,
        starting_agent: impl Into<String>,
        history: Vec<Item>,
        input: Vec<Item>,
        max_turns: usize,
    ) -> Self {
        let starting_agent = starting_agent.into();
        let now = Utc::now();
        let mut context = history.clone();
        context.extend(input.iter().cloned());
        Self {
            run_id: run_id.into(),
            active_agent: starting_agent.clone(),
            starting_agent,
            history,
            context,
            new_items: input,
            current_turn: 0,
            max_turns,
            status: RunStatus::Running,
            pending_approvals: Vec::new(),
            approvals: BTreeMap::new(),
            pending_final: None,
            usage: Usage::default(),
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append an item produced by the run.
    ///
    /// A tool result whose call is no longer in the context (dropped by a
    /// handoff input filter) is kept for the session but hidden from the
    /// model.
    pub fn record(&mut self, item: Item) {
        let visible = match &item {
            Item::ToolResult(result) => self.context.iter().any(|i| {
                matches!(i, Item::ToolCall(call) if call.call_id == result.call_id)
            }),
            _ => true,
        };
        if visible {
            self.context.push(item.clone());
        }
        self.new_items.push(item);
        self.touch();
    }

    /// Remove the newest assistant message from both the context and the new
    /// items.
    pub fn retract_last_assistant_message(&mut self) -> Option<Item> {
        let idx = self
            .new_items
            .iter()
            .rposition(|i| matches!(i, Item::AssistantMessage(_)))?;
        let removed = self.new_items.remove(idx);
        if let Some(ctx_idx) = self.context.iter().rposition(|i| *i == removed) {
            self.context.remove(ctx_idx);
        }
        self.touch();
        Some(removed)
    }

    pub fn pending_approvals(&self) -> &[PendingApproval] {
        &self.pending_approvals
    }

    pub fn pending_approval(&self, call_id: &str) -> Option<&PendingApproval> {
        self.pending_approvals
            .iter()
            .find(|p| p.call.call_id == call_id)
    }

    pub fn is_pending(&self) -> bool {
        !self.pending_approvals.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Check that this state can run against `graph`.
    pub fn validate(&self, graph: &AgentGraph) -> Result<()> {
        if graph.start_name() != self.starting_agent {
            return Err(BatonError::InvalidState(format!(
                "run started at agent '{}' but graph starts at '{}'",
                self.starting_agent,
                graph.start_name()
            )));
        }
        graph.get(&self.active_agent)?;
        if !graph.is_reachable(&self.starting_agent, &self.active_agent) {
            return Err(BatonError::InvalidState(format!(
                "agent '{}' is not reachable from '{}'",
                self.active_agent, self.starting_agent
            )));
        }
        if self.current_turn > self.max_turns {
            return Err(BatonError::InvalidState(format!(
                "turn {} exceeds max turns {}",
                self.current_turn, self.max_turns
            )));
        }
        for pending in &self.pending_approvals {
            graph.get(&pending.agent)?;
        }
        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentGraph};
    use serde_json::json;

    fn state() -> RunState {
        RunState::new(
            "run-1",
            "triage",
            vec![Item::user("earlier")],
            vec![Item::user("now")],
            5,
        )
    }

    #[test]
    fn new_state_sees_history_and_input() {
        let state = state();
        assert_eq!(state.context, vec![Item::user("earlier"), Item::user("now")]);
        assert_eq!(state.new_items, vec![Item::user("now")]);
        assert_eq!(state.status, RunStatus::Running);
    }

    #[test]
    fn orphaned_tool_result_is_hidden_from_context() {
        let mut state = state();
        state.record(Item::tool_result("gone", "lookup", json!("x"), false));

        assert_eq!(state.new_items.len(), 2);
        assert_eq!(state.context.len(), 2);
    }

    #[test]
    fn retract_removes_last_assistant_message() {
        let mut state = state();
        state.record(Item::assistant("draft"));

        let removed = state.retract_last_assistant_message();

        assert_eq!(removed, Some(Item::assistant("draft")));
        assert!(!state.context.contains(&Item::assistant("draft")));
        assert!(!state.new_items.contains(&Item::assistant("draft")));
    }

    #[test]
    fn validate_rejects_unreachable_active_agent() {
        let graph = AgentGraph::builder()
            .agent(Agent::new("triage"))
            .agent(Agent::new("island"))
            .build("triage")
            .unwrap();
        let mut state = state();
        assert!(state.validate(&graph).is_ok());

        state.active_agent = "island".to_string();
        let err = state.validate(&graph).unwrap_err();
        assert!(matches!(err, BatonError::InvalidState(_)));
    }

    #[test]
    fn json_round_trip_preserves_state() {
        let mut state = state();
        state.pending_approvals.push(PendingApproval {
            call: ToolCallItem {
                call_id: "c1".into(),
                name: "delete".into(),
                arguments: json!({"id": 1}),
                agent: Some("triage".into()),
            },
            agent: "triage".into(),
            final_candidate: false,
        });

        let restored = RunState::from_json(&state.to_json().unwrap()).unwrap();

        assert_eq!(restored, state);
        assert_eq!(restored.pending_approval("c1").unwrap().tool_name(), "delete");
    }
}
