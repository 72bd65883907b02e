//! The run state machine.
//!
//! A run repeatedly calls the model for the active agent, executes the tool
//! calls it asks for, follows handoffs, and stops when the agent produces a
//! final answer, a guardrail rejects, or a tool call needs approval. A
//! suspended run is a serializable [`RunState`] that [`Runner::resume`]
//! continues.

pub mod context;
pub mod control;
pub(crate) mod engine;
pub mod events;
pub mod runner;
pub mod state;
pub mod trace;

pub use context::RunContext;
pub use control::{RunInput, RunOptions};
pub use events::{RunEvent, RunEventPayload, RunEventSink, RunEventStream, RunLifecycle};
pub use runner::{RunResult, RunStream, Runner};
pub use state::{PendingApproval, RunState, RunStatus};
pub use trace::{
    ActiveSpan, NoopTraceSink, RecordingSink, SpanKind, SpanRecord, TraceSink, Tracer,
    TracingSink,
};
