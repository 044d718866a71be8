//! Upstream endpoint adapters.
//!
//! An [`Endpoint`] turns a normalized [`GenerationRequest`] into a stream of
//! [`GenerationUpdate`]s. The only implementation is the OpenAI-compatible
//! adapter in [`openai`], which covers every provider the gateway talks to
//! (OpenAI, Groq, the Hugging Face router and self-hosted lookalikes).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::GenerationSettings;

pub mod error;
pub mod groq;
pub mod openai;
pub(crate) mod prompt;
pub(crate) mod wire;

pub use error::{classify_api_error, EndpointError};
pub use groq::{groq_global_endpoint, is_groq_regional_endpoint, GROQ_GLOBAL_ENDPOINT};
pub use openai::OpenAiEndpoint;

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// An attachment carried alongside a message, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageFile {
    pub name: String,
    pub mime: String,
    /// Base64-encoded file content.
    pub data: String,
}

/// A conversation turn in the gateway's own shape, before any wire encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<MessageFile>,
}

impl EndpointMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            files: Vec::new(),
        }
    }
}

// ============================================================================
// Generation requests and updates
// ============================================================================

/// Everything an endpoint needs for one generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub messages: Vec<EndpointMessage>,
    pub preprompt: Option<String>,
    /// Per-request sampling overrides, layered over the model's defaults.
    pub settings: GenerationSettings,
    pub conversation_id: Option<String>,
    /// Caller-supplied bearer forwarded upstream instead of the configured key.
    pub bearer_token: Option<String>,
    /// Overrides the model's multimodal flag for this request only.
    pub multimodal_override: Option<bool>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Incremental output of a generation call.
///
/// Streaming deployments emit any number of `Delta`s followed by one `Final`
/// carrying the accumulated text. Non-streaming deployments emit the `Final`
/// alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GenerationUpdate {
    Delta {
        text: String,
    },
    Final {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<GenerationUsage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

// ============================================================================
// Router metadata
// ============================================================================

/// Routing attribution reported by multi-provider routers through response
/// headers. Either `route` + `model` arrive together or `provider` arrives
/// alone; plain providers send nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Shared cell the adapter fills when routing headers show up. Callers keep a
/// clone and query it after (or alongside) the event stream.
#[derive(Debug, Clone, Default)]
pub struct RouterMetadataHandle(Arc<parking_lot::RwLock<Option<RouterMetadata>>>);

impl RouterMetadataHandle {
    pub fn record(&self, metadata: RouterMetadata) {
        *self.0.write() = Some(metadata);
    }

    pub fn get(&self) -> Option<RouterMetadata> {
        self.0.read().clone()
    }
}

// ============================================================================
// Endpoint trait
// ============================================================================

/// Single-pass event stream for one generation call. Not restartable.
#[derive(Debug)]
pub struct GenerationStream {
    pub events: mpsc::Receiver<Result<GenerationUpdate, EndpointError>>,
    pub router_metadata: RouterMetadataHandle,
}

#[async_trait]
pub trait Endpoint: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationStream, EndpointError>;
}
