//! Model backend contract and in-process backends.

pub mod retry;
pub mod scripted;
pub mod stream;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Result;
use crate::types::{Item, ModelResponse, ModelSettings, ModelStreamEvent};

pub use retry::{RetryPolicy, RetryingBackend};
pub use scripted::ScriptedBackend;
pub use stream::fold_stream;

/// A request sent to a model backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRequest {
    /// Name of the agent the request is made for.
    pub agent: String,
    pub instructions: String,
    pub input: Vec<Item>,
    pub tools: Vec<ToolDefinition>,
    pub settings: ModelSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

/// Kind of tool advertised to the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolKind {
    Function,
    Hosted,
    Device,
    Handoff,
}

/// Tool definition sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub kind: ToolKind,
    /// Opaque configuration for hosted tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Core trait implemented by model backends.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Produce a complete response.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse>;

    /// Produce a response as a stream of events ending with
    /// [`ModelStreamEvent::Done`].
    ///
    /// The default implementation calls [`ModelBackend::generate`] and emits
    /// the whole response as a single `Done` event.
    async fn stream(
        &self,
        request: &ModelRequest,
    ) -> Result<BoxStream<'static, Result<ModelStreamEvent>>> {
        let response = self.generate(request).await?;
        Ok(Box::pin(futures::stream::iter(vec![Ok(
            ModelStreamEvent::Done { response },
        )])))
    }
}
