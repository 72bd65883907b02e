use crate::types::Usage;

/// Per-run values visible to dynamic instructions.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub run_id: String,
    /// Active agent name.
    pub agent: String,
    pub turn: usize,
    /// Caller-supplied metadata from [`super::RunOptions`].
    pub metadata: serde_json::Value,
    /// Usage accumulated so far.
    pub usage: Usage,
}
