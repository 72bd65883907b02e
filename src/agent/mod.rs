//! Agents and the graph of handoffs between them.

pub mod agent;
pub mod graph;

pub use agent::{Agent, Instructions, InstructionsFn, ToolUseBehavior};
pub use graph::{AgentGraph, AgentGraphBuilder};
