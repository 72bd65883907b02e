//! Regex deny-list guardrail.

use async_trait::async_trait;
use regex::Regex;

use super::{Guardrail, GuardrailContext, GuardrailResult};
use crate::error::{BatonError, Result};
use crate::types::Item;

/// Rejects candidates whose text matches any of a set of patterns.
///
/// Applied to model input it checks user messages; applied to tool values it
/// checks every string leaf.
#[derive(Debug, Clone)]
pub struct PatternGuardrail {
    name: String,
    patterns: Vec<Regex>,
    message: Option<String>,
}

impl PatternGuardrail {
    pub fn new<I, S>(name: impl Into<String>, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    BatonError::Configuration(format!("guardrail '{name}': invalid pattern: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name,
            patterns,
            message: None,
        })
    }

    /// Message returned on rejection instead of the default.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The first pattern matching `text`.
    pub fn find_match(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|re| re.is_match(text))
            .map(|re| re.as_str())
    }

    fn verdict<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> GuardrailResult {
        for text in texts {
            if let Some(pattern) = self.find_match(text) {
                tracing::debug!(guardrail = %self.name, pattern, "pattern matched");
                return GuardrailResult::reject(self.message.clone().unwrap_or_else(|| {
                    format!("Blocked by guardrail '{}'", self.name)
                }));
            }
        }
        GuardrailResult::Allow
    }
}

#[async_trait]
impl Guardrail<str> for PatternGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, _ctx: &GuardrailContext, candidate: &str) -> Result<GuardrailResult> {
        Ok(self.verdict([candidate]))
    }
}

#[async_trait]
impl Guardrail<[Item]> for PatternGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, _ctx: &GuardrailContext, candidate: &[Item]) -> Result<GuardrailResult> {
        Ok(self.verdict(candidate.iter().filter_map(|item| match item {
            Item::UserMessage(m) => Some(m.text.as_str()),
            _ => None,
        })))
    }
}

#[async_trait]
impl Guardrail<serde_json::Value> for PatternGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(
        &self,
        _ctx: &GuardrailContext,
        candidate: &serde_json::Value,
    ) -> Result<GuardrailResult> {
        let mut leaves = Vec::new();
        collect_strings(candidate, &mut leaves);
        Ok(self.verdict(leaves))
    }
}

fn collect_strings<'a>(value: &'a serde_json::Value, out: &mut Vec<&'a str>) {
    match value {
        serde_json::Value::String(s) => out.push(s),
        serde_json::Value::Array(values) => values.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn matches_user_messages_only() {
        let guard = PatternGuardrail::new("no-pw", [r"(?i)password"]).unwrap();
        let ctx = GuardrailContext::default();

        let assistant_only = vec![Item::assistant("what is your password?")];
        let user = vec![Item::user("my Password is hunter2")];

        let a = Guardrail::<[Item]>::check(&guard, &ctx, &assistant_only).await.unwrap();
        let b = Guardrail::<[Item]>::check(&guard, &ctx, &user).await.unwrap();

        assert!(a.is_allowed());
        assert_eq!(b, GuardrailResult::reject("Blocked by guardrail 'no-pw'"));
    }

    #[tokio::test]
    async fn nested_tool_arguments_are_scanned() {
        let guard = PatternGuardrail::new("no-rm", [r"rm\s+-rf"])
            .unwrap()
            .with_message("destructive command");
        let args = json!({"steps": [{"cmd": "ls"}, {"cmd": "rm -rf /"}]});

        let result = Guardrail::<serde_json::Value>::check(&guard, &GuardrailContext::default(), &args)
            .await
            .unwrap();

        assert_eq!(result, GuardrailResult::reject("destructive command"));
    }

    #[test]
    fn invalid_pattern_is_configuration_error() {
        let err = PatternGuardrail::new("bad", ["("]).unwrap_err();
        assert!(matches!(err, BatonError::Configuration(_)));
    }
}
