//! Baton: multi-agent run orchestration.
//!
//! Coordinates multi-turn conversations between a caller, a graph of agents
//! (instructions, tools and transfer targets) and a model backend. The
//! [`run::Runner`] calls the model, executes tools concurrently, evaluates
//! guardrails, switches agents on handoff, suspends for human approval and
//! commits results to a pluggable [`session::Session`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use baton::prelude::*;
//!
//! # async fn example() -> baton::Result<()> {
//! let backend = Arc::new(ScriptedBackend::new(vec![ModelResponse::message("Hi!")]));
//! let graph = AgentGraph::single(Agent::new("assistant").with_instructions("Be brief."))?;
//! let result = Runner::new(backend)
//!     .run(&graph, "Hello", RunOptions::default())
//!     .await?;
//! println!("{}", result.final_output.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod handoff;
pub mod model;
pub mod prelude;
pub mod run;
pub mod session;
pub mod tools;
pub mod types;

pub use error::{BatonError, Result};
