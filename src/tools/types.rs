//! Tool parameter schemas and approval decisions.

use serde::{Deserialize, Serialize};

/// JSON Schema-based parameter definition for a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolParameters {
    /// JSON Schema object describing the parameters.
    pub schema: serde_json::Value,
}

impl ToolParameters {
    /// Create from a raw JSON Schema value.
    pub fn from_schema(schema: serde_json::Value) -> Self {
        Self { schema }
    }

    /// Create an empty parameter schema (no parameters).
    pub fn empty() -> Self {
        Self {
            schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        }
    }

    /// Builder: create an object schema with properties.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builder for constructing tool parameter schemas.
pub struct ParameterBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.typed(name, "string", description, required)
    }

    pub fn number(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.typed(name, "number", description, required)
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.typed(name, "integer", description, required)
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.typed(name, "boolean", description, required)
    }

    /// Add an enum (string) property.
    pub fn string_enum(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": "string",
                "description": description.into(),
                "enum": values,
            }),
            required,
        )
    }

    /// Add an array property whose elements match `items`.
    pub fn array(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        items: serde_json::Value,
        required: bool,
    ) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": "array",
                "description": description.into(),
                "items": items,
            }),
            required,
        )
    }

    /// Add a property with an arbitrary schema (e.g. a nested object built
    /// with another [`ParameterBuilder`]).
    pub fn property(mut self, name: impl Into<String>, schema: serde_json::Value, required: bool) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    fn typed(
        self,
        name: impl Into<String>,
        ty: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": ty,
                "description": description.into(),
            }),
            required,
        )
    }

    pub fn build(self) -> ToolParameters {
        ToolParameters {
            schema: serde_json::json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// A human decision on a suspended tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ApprovalDecision {
    pub fn reject(message: impl Into<String>) -> Self {
        Self::Reject {
            message: Some(message.into()),
        }
    }

    /// Output reported to the model for a rejected call.
    pub(crate) fn rejection_output(&self) -> Option<String> {
        match self {
            Self::Approve => None,
            Self::Reject { message } => Some(match message {
                Some(message) => format!("Tool call rejected: {message}"),
                None => "Tool call rejected".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_records_required_fields_in_order() {
        let params = ToolParameters::object()
            .string("city", "City name", true)
            .integer("days", "Forecast length", false)
            .array("tags", "Labels", json!({"type": "string"}), true)
            .build();

        assert_eq!(params.schema["required"], json!(["city", "tags"]));
        assert_eq!(params.schema["properties"]["days"]["type"], "integer");
        assert_eq!(params.schema["properties"]["tags"]["items"]["type"], "string");
    }

    #[test]
    fn rejection_output_includes_reason() {
        assert_eq!(
            ApprovalDecision::reject("too risky").rejection_output().as_deref(),
            Some("Tool call rejected: too risky")
        );
        assert_eq!(ApprovalDecision::Approve.rejection_output(), None);
    }
}
