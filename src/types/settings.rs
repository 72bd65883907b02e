//! Model settings attached to an agent.

use std::collections::HashMap;

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Settings forwarded to the model backend with every request.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelSettings {
    #[builder(into)]
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub tool_choice: Option<ToolChoice>,
    pub parallel_tool_calls: Option<bool>,
    /// Backend-specific options passed through untouched.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[builder(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// How the model may use tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Required,
    None,
    /// Force a specific tool by name.
    Tool(String),
}

impl ModelSettings {
    /// Settings in `overrides` win over `self` where set.
    pub fn merged_with(&self, overrides: &ModelSettings) -> ModelSettings {
        let mut extra = self.extra.clone();
        extra.extend(overrides.extra.clone());
        ModelSettings {
            model: overrides.model.clone().or_else(|| self.model.clone()),
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            tool_choice: overrides
                .tool_choice
                .clone()
                .or_else(|| self.tool_choice.clone()),
            parallel_tool_calls: overrides.parallel_tool_calls.or(self.parallel_tool_calls),
            extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_and_unset_fields_fall_through() {
        let base = ModelSettings::builder()
            .model("base-model")
            .temperature(0.2)
            .build();
        let overrides = ModelSettings::builder().temperature(0.9).build();

        let merged = base.merged_with(&overrides);

        assert_eq!(merged.model.as_deref(), Some("base-model"));
        assert_eq!(merged.temperature, Some(0.9));
    }
}
