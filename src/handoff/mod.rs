//! Handoffs: transferring control of a run from one agent to another.
//!
//! Each declared handoff is advertised to the model as a synthetic
//! `transfer_to_<agent>` tool. Calling it switches the active agent.

use std::fmt;
use std::sync::Arc;

use serde_json::json;

use crate::agent::AgentGraph;
use crate::error::Result;
use crate::model::{ToolDefinition, ToolKind};
use crate::run::state::RunState;
use crate::run::trace::{SpanKind, Tracer};
use crate::tools::registry::{ResolvedTool, ToolRegistry};
use crate::types::{HandoffItem, Item, ToolCallItem};

/// Prefix of synthetic transfer tool names.
pub const TRANSFER_PREFIX: &str = "transfer_to_";

/// What an input filter sees when a handoff is applied.
#[derive(Debug, Clone)]
pub struct HandoffInputData {
    pub from_agent: String,
    pub to_agent: String,
    /// The context the previous agent saw, including this turn's output.
    pub items: Vec<Item>,
}

/// Rewrites the context handed to the receiving agent.
pub type HandoffInputFilter = Arc<dyn Fn(HandoffInputData) -> Vec<Item> + Send + Sync>;

/// A declared transfer target.
#[derive(Clone)]
pub struct Handoff {
    /// Name of the receiving agent.
    pub target: String,
    pub tool_name_override: Option<String>,
    pub tool_description_override: Option<String>,
    pub input_filter: Option<HandoffInputFilter>,
}

impl Handoff {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            tool_name_override: None,
            tool_description_override: None,
            input_filter: None,
        }
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name_override = Some(name.into());
        self
    }

    pub fn with_tool_description(mut self, description: impl Into<String>) -> Self {
        self.tool_description_override = Some(description.into());
        self
    }

    pub fn with_input_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(HandoffInputData) -> Vec<Item> + Send + Sync + 'static,
    {
        self.input_filter = Some(Arc::new(filter));
        self
    }

    /// Name of the synthetic transfer tool.
    pub fn tool_name(&self) -> String {
        self.tool_name_override
            .clone()
            .unwrap_or_else(|| transfer_tool_name(&self.target))
    }

    /// Backend-facing definition of the transfer tool.
    pub fn definition(&self, graph: &AgentGraph) -> ToolDefinition {
        let description = self.tool_description_override.clone().unwrap_or_else(|| {
            let about = graph
                .get(&self.target)
                .ok()
                .and_then(|agent| agent.handoff_description.clone());
            match about {
                Some(about) => format!(
                    "Handoff to the {} agent to handle the request. {about}",
                    self.target
                ),
                None => format!("Handoff to the {} agent to handle the request.", self.target),
            }
        });
        ToolDefinition {
            name: self.tool_name(),
            description,
            parameters: json!({ "type": "object", "properties": {}, "required": [] }),
            kind: ToolKind::Handoff,
            config: None,
        }
    }
}

impl From<&str> for Handoff {
    fn from(target: &str) -> Self {
        Self::to(target)
    }
}

impl From<String> for Handoff {
    fn from(target: String) -> Self {
        Self::to(target)
    }
}

impl fmt::Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("target", &self.target)
            .field("tool_name", &self.tool_name())
            .field("input_filter", &self.input_filter.is_some())
            .finish()
    }
}

/// `transfer_to_<snake_case target>`.
pub fn transfer_tool_name(target: &str) -> String {
    let mut name = String::with_capacity(TRANSFER_PREFIX.len() + target.len());
    name.push_str(TRANSFER_PREFIX);
    let mut last_underscore = true;
    for ch in target.chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            name.push('_');
            last_underscore = true;
        }
    }
    while name.ends_with('_') && name.len() > TRANSFER_PREFIX.len() {
        name.pop();
    }
    name
}

/// Whether `name` follows the transfer tool naming scheme.
pub fn is_transfer_tool_name(name: &str) -> bool {
    name.starts_with(TRANSFER_PREFIX)
}

/// A handoff the model asked for.
#[derive(Debug, Clone)]
pub struct HandoffRequest {
    pub call: ToolCallItem,
    pub from_agent: String,
    pub handoff: Handoff,
}

/// The first call in `calls` that resolves to a declared handoff.
pub fn detect(calls: &[ToolCallItem], registry: &ToolRegistry<'_>) -> Option<HandoffRequest> {
    calls.iter().find_map(|call| match registry.resolve(&call.name) {
        Ok(ResolvedTool::Handoff(handoff)) => Some(HandoffRequest {
            call: call.clone(),
            from_agent: registry.agent_name().to_string(),
            handoff: handoff.clone(),
        }),
        _ => None,
    })
}

/// Switch the active agent.
///
/// Runs the input filter over the context, swaps the active agent, then
/// records the transfer tool result and one [`HandoffItem`]. The turn counter
/// is left untouched.
pub fn apply(
    state: &mut RunState,
    request: &HandoffRequest,
    graph: &AgentGraph,
    tracer: &Tracer,
) -> Result<()> {
    let target = graph.get(&request.handoff.target)?;
    let mut span = tracer.start(SpanKind::Handoff, format!("{} -> {}", request.from_agent, target.name));
    span.set_attribute("from_agent", request.from_agent.clone());
    span.set_attribute("to_agent", target.name.clone());

    if let Some(filter) = &request.handoff.input_filter {
        let items = std::mem::take(&mut state.context);
        let before = items.len();
        state.context = filter(HandoffInputData {
            from_agent: request.from_agent.clone(),
            to_agent: target.name.clone(),
            items,
        });
        span.set_attribute("filtered_items", before.saturating_sub(state.context.len()));
    }

    state.active_agent = target.name.clone();
    state.record(Item::tool_result(
        request.call.call_id.clone(),
        request.call.name.clone(),
        json!({ "assistant": target.name }),
        false,
    ));
    state.record(Item::Handoff(HandoffItem {
        from_agent: request.from_agent.clone(),
        to_agent: target.name.clone(),
        call_id: request.call.call_id.clone(),
    }));

    tracing::info!(
        run_id = %state.run_id,
        turn = state.current_turn,
        from = %request.from_agent,
        to = %target.name,
        "handoff"
    );
    span.end();
    Ok(())
}

/// Keep only the last `n` user/assistant messages.
pub fn keep_last_messages(n: usize) -> HandoffInputFilter {
    Arc::new(move |data: HandoffInputData| {
        let messages: Vec<Item> = data.items.into_iter().filter(Item::is_message).collect();
        let skip = messages.len().saturating_sub(n);
        messages.into_iter().skip(skip).collect()
    })
}

/// Drop tool calls, tool results and approval markers.
pub fn remove_tool_items() -> HandoffInputFilter {
    Arc::new(|data: HandoffInputData| {
        data.items
            .into_iter()
            .filter(|item| !item.is_tool_item())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(items: Vec<Item>) -> HandoffInputData {
        HandoffInputData {
            from_agent: "a".into(),
            to_agent: "b".into(),
            items,
        }
    }

    #[test]
    fn transfer_names_are_snake_case() {
        assert_eq!(transfer_tool_name("Billing Agent"), "transfer_to_billing_agent");
        assert_eq!(transfer_tool_name("cats"), "transfer_to_cats");
        assert_eq!(transfer_tool_name("x--y!"), "transfer_to_x_y");
        assert!(is_transfer_tool_name("transfer_to_cats"));
    }

    #[test]
    fn keep_last_messages_drops_older_and_non_message_items() {
        let filter = keep_last_messages(2);
        let items = vec![
            Item::user("one"),
            Item::assistant("two"),
            Item::tool_call("c", "t", json!({})),
            Item::user("three"),
        ];

        let kept = filter(data(items));

        assert_eq!(kept, vec![Item::assistant("two"), Item::user("three")]);
    }

    #[test]
    fn remove_tool_items_keeps_messages_and_markers() {
        let filter = remove_tool_items();
        let items = vec![
            Item::user("q"),
            Item::tool_call("c", "t", json!({})),
            Item::tool_result("c", "t", json!("r"), false),
            Item::Handoff(HandoffItem {
                from_agent: "x".into(),
                to_agent: "y".into(),
                call_id: "h".into(),
            }),
        ];

        let kept = filter(data(items));

        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|i| !i.is_tool_item()));
    }

    #[test]
    fn custom_tool_name_overrides_default() {
        let handoff = Handoff::to("cats").with_tool_name("ask_cat_expert");
        assert_eq!(handoff.tool_name(), "ask_cat_expert");
    }
}
