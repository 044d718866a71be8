//! The OpenAI-compatible endpoint adapter.
//!
//! One adapter instance per configured model. `chat_completions` deployments
//! get prepared message arrays, the preprompt merge, the gpt-oss tool
//! injection and the single tool-choice retry; legacy `completions`
//! deployments get a rendered prompt and always stream. Both normalize
//! upstream output into [`GenerationUpdate`] events on a bounded channel.

use bytes::BytesMut;
use futures::StreamExt;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{
    CompletionMode, GenerationSettings, ModelConfig, EVENT_CHANNEL_CAPACITY, PLACEHOLDER_API_KEY,
};
use crate::media::ImageProcessor;
use crate::messages::prepare_messages_with_files;

use super::error::classify_api_error;
use super::groq::{groq_global_endpoint, is_groq_regional_endpoint, GROQ_GLOBAL_ENDPOINT};
use super::prompt::PromptTemplate;
use super::wire::{
    merge_body, ChatCompletionsBody, ChatCompletionsResponse, ChatMessage, ChatStreamChunk,
    CompletionsBody, CompletionsStreamChunk, WireUsage,
};
use super::{
    Endpoint, EndpointError, GenerationRequest, GenerationStream, GenerationUpdate,
    GenerationUsage, RouterMetadata, RouterMetadataHandle,
};

/// Conversation correlation header sent upstream on every call.
pub const CONVERSATION_ID_HEADER: &str = "Reefchat-Conversation-Id";

/// Models matching this prefix get the hosted tool set injected.
const OSS_MODEL_PREFIX: &str = "openai/gpt-oss-";

const ROUTER_ROUTE_HEADER: &str = "x-router-route";
const ROUTER_MODEL_HEADER: &str = "x-router-model";
const INFERENCE_PROVIDER_HEADER: &str = "x-inference-provider";

fn oss_default_tools() -> Vec<Value> {
    vec![
        json!({"type": "browser_search"}),
        json!({"type": "code_interpreter"}),
    ]
}

pub struct OpenAiEndpoint {
    model_id: String,
    base_url: String,
    api_key: String,
    completion: CompletionMode,
    client: Client,
    default_query: IndexMap<String, String>,
    extra_body: Option<Map<String, Value>>,
    multimodal: bool,
    image_processor: ImageProcessor,
    use_completion_tokens: bool,
    streaming_supported: bool,
    parameters: GenerationSettings,
    prompt_template: PromptTemplate,
}

impl OpenAiEndpoint {
    /// Build an adapter for one configured model. Fails on a broken prompt
    /// template; invalid default headers are skipped with a warning.
    pub fn from_config(model: &ModelConfig) -> anyhow::Result<Self> {
        let endpoint = &model.endpoint;

        let trimmed = endpoint.base_url.trim_end_matches('/').to_string();
        let base_url = if is_groq_regional_endpoint(&trimmed) {
            info!(
                model = %model.id,
                from = %trimmed,
                to = GROQ_GLOBAL_ENDPOINT,
                "rewriting regional Groq endpoint to the global endpoint"
            );
            groq_global_endpoint(&trimmed).to_string()
        } else {
            trimmed
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &endpoint.default_headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "skipping invalid default header"),
            }
        }
        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            model_id: model.id.clone(),
            base_url,
            api_key: endpoint
                .api_key
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string()),
            completion: endpoint.completion,
            client,
            default_query: endpoint.default_query.clone(),
            extra_body: endpoint.extra_body.clone(),
            multimodal: model.multimodal,
            image_processor: ImageProcessor::new(endpoint.multimodal.image.clone()),
            use_completion_tokens: endpoint.use_completion_tokens,
            streaming_supported: endpoint.streaming_supported,
            parameters: model.parameters.clone(),
            prompt_template: PromptTemplate::compile(endpoint.chat_prompt_template.as_deref())?,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn generate_chat(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationStream, EndpointError> {
        let multimodal = request.multimodal_override.unwrap_or(self.multimodal);
        let mut messages =
            prepare_messages_with_files(&request.messages, &self.image_processor, multimodal)?;
        merge_preprompt(&mut messages, request.preprompt.as_deref());

        let settings = self.parameters.overridden_by(&request.settings);
        let (base, protected_tool_choice) = self.chat_body(messages, &settings);
        let body = merge_body(
            encode_body(&base)?,
            self.extra_body.as_ref(),
            protected_tool_choice.as_ref(),
        );

        let metadata = RouterMetadataHandle::default();
        let response = match self
            .dispatch("/chat/completions", &body, &request, &metadata)
            .await
        {
            Ok(response) => response,
            Err(EndpointError::ToolChoiceRequired { status, message }) => {
                warn!(
                    model = %self.model_id,
                    status,
                    message = %message,
                    "forced tool choice failed upstream, retrying once with tool_choice=auto"
                );
                let retry_extra = self.extra_body.clone().map(|mut extra| {
                    extra.remove("tool_choice");
                    extra
                });
                let auto = json!("auto");
                let retry_body = merge_body(encode_body(&base)?, retry_extra.as_ref(), Some(&auto));
                self.dispatch("/chat/completions", &retry_body, &request, &metadata)
                    .await?
            }
            Err(other) => return Err(other),
        };

        if self.streaming_supported {
            Ok(spawn_stream(
                response,
                request.cancel.clone(),
                metadata,
                parse_chat_frame,
            ))
        } else {
            Ok(spawn_materialized(response, metadata))
        }
    }

    async fn generate_completions(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationStream, EndpointError> {
        let prompt = self
            .prompt_template
            .render(request.preprompt.as_deref(), &request.messages)?;
        let settings = self.parameters.overridden_by(&request.settings);
        let base = CompletionsBody {
            model: self.model_id.clone(),
            prompt,
            stream: true,
            max_tokens: settings.max_tokens,
            stop: settings.stop.clone(),
            temperature: settings.temperature,
            top_p: settings.top_p,
            frequency_penalty: settings.frequency_penalty,
            presence_penalty: settings.presence_penalty,
        };
        let body = merge_body(encode_body(&base)?, self.extra_body.as_ref(), None);

        let metadata = RouterMetadataHandle::default();
        let response = self
            .dispatch("/completions", &body, &request, &metadata)
            .await?;
        Ok(spawn_stream(
            response,
            request.cancel.clone(),
            metadata,
            parse_completions_frame,
        ))
    }

    /// Assemble the chat body plus the tool choice that must survive the
    /// extra-body overlay (set only for gpt-oss models).
    fn chat_body(
        &self,
        messages: Vec<ChatMessage>,
        settings: &GenerationSettings,
    ) -> (ChatCompletionsBody, Option<Value>) {
        let (max_tokens, max_completion_tokens) = if self.use_completion_tokens {
            (None, settings.max_tokens)
        } else {
            (settings.max_tokens, None)
        };

        let oss = self.model_id.starts_with(OSS_MODEL_PREFIX);
        let tool_choice = oss.then(|| json!("auto"));

        let body = ChatCompletionsBody {
            model: self.model_id.clone(),
            messages,
            stream: self.streaming_supported,
            max_tokens,
            max_completion_tokens,
            stop: settings.stop.clone(),
            temperature: settings.temperature,
            top_p: settings.top_p,
            frequency_penalty: settings.frequency_penalty,
            presence_penalty: settings.presence_penalty,
            tools: oss.then(oss_default_tools),
            tool_choice: tool_choice.clone(),
        };
        (body, tool_choice)
    }

    /// Send one upstream request. Classifies non-2xx bodies into typed
    /// errors and records router metadata from the response headers, so
    /// callers never see raw upstream responses that failed.
    async fn dispatch(
        &self,
        path: &str,
        body: &Value,
        request: &GenerationRequest,
        metadata: &RouterMetadataHandle,
    ) -> Result<reqwest::Response, EndpointError> {
        let bearer = request.bearer_token.as_deref().unwrap_or(&self.api_key);

        debug!(model = %self.model_id, path, "dispatching upstream request");
        let send = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .query(&self.default_query)
            .bearer_auth(bearer)
            .header(
                CONVERSATION_ID_HEADER,
                request.conversation_id.as_deref().unwrap_or(""),
            )
            .header("X-use-cache", "false")
            .json(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = request.cancel.cancelled() => return Err(EndpointError::Cancelled),
            result = send => result?,
        };

        capture_router_metadata(metadata, response.headers());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status.as_u16(), &body));
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl Endpoint for OpenAiEndpoint {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationStream, EndpointError> {
        match self.completion {
            CompletionMode::Completions => self.generate_completions(request).await,
            CompletionMode::ChatCompletions => self.generate_chat(request).await,
        }
    }
}

/// Merge a non-empty preprompt into the conversation: prepend to an existing
/// leading system message, otherwise insert a new one. Whitespace-only
/// preprompts change nothing.
fn merge_preprompt(messages: &mut Vec<ChatMessage>, preprompt: Option<&str>) {
    let preprompt = preprompt.unwrap_or("").trim();
    if preprompt.is_empty() {
        return;
    }
    match messages.first_mut() {
        Some(first) if first.role == "system" && first.content.is_string() => {
            let existing = first.content.as_str().unwrap_or_default();
            first.content = Value::String(if existing.is_empty() {
                preprompt.to_owned()
            } else {
                format!("{preprompt}\n\n{existing}")
            });
        }
        _ => {
            messages.insert(0, ChatMessage::text("system", preprompt));
        }
    }
}

fn encode_body<T: serde::Serialize>(body: &T) -> Result<Value, EndpointError> {
    serde_json::to_value(body)
        .map_err(|err| EndpointError::InvalidRequest(format!("request encoding: {err}")))
}

fn capture_router_metadata(handle: &RouterMetadataHandle, headers: &HeaderMap) {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };

    if let (Some(route), Some(model)) = (get(ROUTER_ROUTE_HEADER), get(ROUTER_MODEL_HEADER)) {
        debug!(route = %route, model = %model, "captured router metadata");
        handle.record(RouterMetadata {
            route: Some(route),
            model: Some(model),
            provider: None,
        });
    } else if let Some(provider) = get(INFERENCE_PROVIDER_HEADER) {
        debug!(provider = %provider, "captured inference provider");
        handle.record(RouterMetadata {
            route: None,
            model: None,
            provider: Some(provider),
        });
    }
}

// ============================================================================
// Stream normalization
// ============================================================================

/// Everything one SSE frame can contribute to the event stream.
#[derive(Default)]
struct FrameContent {
    deltas: Vec<String>,
    usage: Option<WireUsage>,
    finish_reason: Option<String>,
}

fn parse_chat_frame(data: &str) -> Option<FrameContent> {
    let chunk: ChatStreamChunk = serde_json::from_str(data).ok()?;
    let mut frame = FrameContent {
        usage: chunk.usage,
        ..FrameContent::default()
    };
    for choice in chunk.choices {
        if let Some(content) = choice.delta.and_then(|delta| delta.content) {
            if !content.is_empty() {
                frame.deltas.push(content);
            }
        }
        if let Some(reason) = choice.finish_reason {
            frame.finish_reason = Some(reason);
        }
    }
    Some(frame)
}

fn parse_completions_frame(data: &str) -> Option<FrameContent> {
    let chunk: CompletionsStreamChunk = serde_json::from_str(data).ok()?;
    let mut frame = FrameContent {
        usage: chunk.usage,
        ..FrameContent::default()
    };
    for choice in chunk.choices {
        if let Some(text) = choice.text {
            if !text.is_empty() {
                frame.deltas.push(text);
            }
        }
        if let Some(reason) = choice.finish_reason {
            frame.finish_reason = Some(reason);
        }
    }
    Some(frame)
}

fn spawn_stream(
    response: reqwest::Response,
    cancel: CancellationToken,
    router_metadata: RouterMetadataHandle,
    parse_frame: fn(&str) -> Option<FrameContent>,
) -> GenerationStream {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(pump_sse(response, tx, cancel, parse_frame));
    GenerationStream {
        events: rx,
        router_metadata,
    }
}

fn spawn_materialized(
    response: reqwest::Response,
    router_metadata: RouterMetadataHandle,
) -> GenerationStream {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let update = read_chat_completion(response).await;
        let _ = tx.send(update).await;
    });
    GenerationStream {
        events: rx,
        router_metadata,
    }
}

async fn read_chat_completion(
    response: reqwest::Response,
) -> Result<GenerationUpdate, EndpointError> {
    let payload: ChatCompletionsResponse = response.json().await?;
    let (text, finish_reason) = match payload.choices.into_iter().next() {
        Some(choice) => (
            choice.message.content.unwrap_or_default(),
            choice.finish_reason,
        ),
        None => (String::new(), None),
    };
    Ok(GenerationUpdate::Final {
        text,
        usage: payload.usage.map(Into::into),
        finish_reason,
    })
}

/// Incremental SSE pump: reads the body chunk by chunk, splits complete
/// lines, forwards deltas as they arrive and closes with one `Final`
/// carrying the accumulated text. Cancellation drops the stream, which
/// closes the upstream connection.
async fn pump_sse(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<GenerationUpdate, EndpointError>>,
    cancel: CancellationToken,
    parse_frame: fn(&str) -> Option<FrameContent>,
) {
    let mut stream = response.bytes_stream();
    let mut buffer = BytesMut::new();
    let mut text = String::new();
    let mut usage: Option<GenerationUsage> = None;
    let mut finish_reason: Option<String> = None;

    'read: loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Drop the stream explicitly to close the upstream connection
                drop(stream);
                let _ = tx.send(Err(EndpointError::Cancelled)).await;
                return;
            }
            item = stream.next() => item,
        };

        let Some(item) = item else {
            break;
        };

        let bytes = match item {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = tx.send(Err(EndpointError::Stream(err.to_string()))).await;
                return;
            }
        };
        buffer.extend_from_slice(&bytes);

        // Process complete SSE lines; partial lines stay buffered as raw
        // bytes until their newline arrives.
        while let Some(pos) = buffer.iter().position(|byte| *byte == b'\n') {
            let raw = buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw[..pos]);
            let line = line.trim();

            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                break 'read;
            }

            // Skip unparseable chunks
            let Some(frame) = parse_frame(data) else {
                continue;
            };
            if let Some(frame_usage) = frame.usage {
                usage = Some(GenerationUsage::from(frame_usage));
            }
            if let Some(reason) = frame.finish_reason {
                finish_reason = Some(reason);
            }
            for delta in frame.deltas {
                text.push_str(&delta);
                if tx
                    .send(Ok(GenerationUpdate::Delta { text: delta }))
                    .await
                    .is_err()
                {
                    // Consumer is gone, stop pulling from upstream
                    return;
                }
            }
        }
    }

    let _ = tx
        .send(Ok(GenerationUpdate::Final {
            text,
            usage,
            finish_reason,
        }))
        .await;
}
