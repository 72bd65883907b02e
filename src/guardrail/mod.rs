//! Guardrails: checks that can veto a model input, a final output, or a
//! single tool invocation.

pub mod pattern;
pub mod pipeline;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Result;
use crate::types::Item;

pub use pattern::PatternGuardrail;
pub use pipeline::{run_guardrails, run_input_guardrails, run_output_guardrails};

/// Outcome of a single guardrail check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardrailResult {
    Allow,
    Reject { message: String },
}

impl GuardrailResult {
    pub fn reject(message: impl Into<String>) -> Self {
        Self::Reject {
            message: message.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Where a guardrail ran.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GuardrailPhase {
    Input,
    Output,
    ToolInput,
    ToolOutput,
}

/// A rejection recorded on the run result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailRejection {
    pub guardrail: String,
    pub phase: GuardrailPhase,
    pub message: String,
}

/// Read-only view of the run handed to guardrails.
#[derive(Debug, Clone, Default)]
pub struct GuardrailContext {
    pub run_id: String,
    pub agent: String,
    pub turn: usize,
    pub metadata: serde_json::Value,
}

/// A check over a candidate of type `C`.
///
/// Returning `Err` aborts the run; use [`GuardrailResult::Reject`] to veto.
#[async_trait]
pub trait Guardrail<C: ?Sized + Sync>: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, ctx: &GuardrailContext, candidate: &C) -> Result<GuardrailResult>;
}

/// Checks the assembled model input before each model call.
pub type InputGuardrail = Arc<dyn Guardrail<[Item]>>;
/// Checks the proposed final output text.
pub type OutputGuardrail = Arc<dyn Guardrail<str>>;
/// Checks tool arguments or a raw tool result.
pub type ToolGuardrail = Arc<dyn Guardrail<serde_json::Value>>;

/// Closure-based guardrail.
pub struct FnGuardrail<C: ?Sized, F> {
    name: String,
    check: F,
    _candidate: PhantomData<fn(&C)>,
}

impl<C: ?Sized, F> FnGuardrail<C, F> {
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
            _candidate: PhantomData,
        }
    }
}

#[async_trait]
impl<C, F> Guardrail<C> for FnGuardrail<C, F>
where
    C: ?Sized + Sync,
    F: Fn(&GuardrailContext, &C) -> Result<GuardrailResult> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &GuardrailContext, candidate: &C) -> Result<GuardrailResult> {
        (self.check)(ctx, candidate)
    }
}

/// Input guardrail from a closure.
pub fn input_guardrail<F>(name: impl Into<String>, check: F) -> InputGuardrail
where
    F: Fn(&GuardrailContext, &[Item]) -> Result<GuardrailResult> + Send + Sync + 'static,
{
    Arc::new(FnGuardrail::<[Item], F>::new(name, check))
}

/// Output guardrail from a closure.
pub fn output_guardrail<F>(name: impl Into<String>, check: F) -> OutputGuardrail
where
    F: Fn(&GuardrailContext, &str) -> Result<GuardrailResult> + Send + Sync + 'static,
{
    Arc::new(FnGuardrail::<str, F>::new(name, check))
}

/// Tool guardrail from a closure.
pub fn tool_guardrail<F>(name: impl Into<String>, check: F) -> ToolGuardrail
where
    F: Fn(&GuardrailContext, &serde_json::Value) -> Result<GuardrailResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnGuardrail::<serde_json::Value, F>::new(name, check))
}
