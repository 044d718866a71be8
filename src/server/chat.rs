use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GenerationSettings;
use crate::endpoints::{
    Endpoint, EndpointError, EndpointMessage, GenerationRequest, GenerationUpdate,
};
use crate::features::infer_provider_from_model_id;
use crate::server::AppState;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<EndpointMessage>,
    #[serde(default)]
    pub preprompt: Option<String>,
    #[serde(default)]
    pub settings: Option<GenerationSettings>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Overrides the model's multimodal flag for this request.
    #[serde(default)]
    pub multimodal: Option<bool>,
}

/// Stream a generation as server-sent events.
///
/// Every event is a data frame carrying a `type`-tagged JSON object: `delta`
/// frames as the model produces text, one `final` frame (with usage, finish
/// reason and router metadata when captured), or an `error` frame if the
/// upstream call fails mid-stream. Client disconnect cancels the upstream
/// call through the request's cancellation token.
pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let Some(endpoint) = state.endpoints.get(&request.model) else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Unknown model '{}'", request.model),
        );
    };

    let provider = state
        .config
        .model(&request.model)
        .and_then(|model| model.provider.as_deref())
        .or_else(|| infer_provider_from_model_id(&request.model));
    if !state.gate.is_model_enabled(&request.model, provider) {
        warn!(model = %request.model, "request for gated model rejected");
        return error_response(
            StatusCode::FORBIDDEN,
            format!("Model '{}' is not enabled", request.model),
        );
    }

    let conversation_id = request
        .conversation_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    debug!(model = %request.model, conversation_id = %conversation_id, "chat request accepted");

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let generation = GenerationRequest {
        messages: request.messages,
        preprompt: request.preprompt,
        settings: request.settings.unwrap_or_default(),
        conversation_id: Some(conversation_id),
        bearer_token: bearer_from_headers(&headers),
        multimodal_override: request.multimodal,
        cancel,
    };

    let endpoint = Arc::clone(endpoint);
    let stream = match endpoint.generate(generation).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(model = %request.model, error = %err, "generation failed before streaming");
            return error_response(status_for(&err), err.to_string());
        }
    };

    let metadata = stream.router_metadata.clone();
    let events = ReceiverStream::new(stream.events).map(move |item| {
        // The guard lives inside this closure; dropping the response stream
        // on client disconnect cancels the upstream call.
        let _keep = &guard;
        let payload = match item {
            Ok(update) => {
                let mut value = serde_json::to_value(&update)
                    .unwrap_or_else(|_| json!({"type": "error", "message": "encoding failed"}));
                if matches!(update, GenerationUpdate::Final { .. }) {
                    if let Some(routing) = metadata.get() {
                        if let (Some(object), Ok(routing)) =
                            (value.as_object_mut(), serde_json::to_value(&routing))
                        {
                            object.insert("routerMetadata".to_string(), routing);
                        }
                    }
                }
                value
            }
            Err(err) => json!({"type": "error", "message": err.to_string()}),
        };
        Ok::<Event, Infallible>(Event::default().data(payload.to_string()))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

fn status_for(error: &EndpointError) -> StatusCode {
    match error {
        EndpointError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({"error": {"message": message}}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn bearer_extracted_from_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer caller-token"),
        );
        assert_eq!(
            bearer_from_headers(&headers),
            Some("caller-token".to_string())
        );
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(bearer_from_headers(&headers), None);
        assert_eq!(bearer_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn request_body_parses_camel_case() {
        let request: ChatRequest = serde_json::from_value(json!({
            "model": "openai/gpt-oss-20b",
            "messages": [{"role": "user", "content": "hi"}],
            "conversationId": "conv-1",
            "multimodal": true
        }))
        .unwrap();
        assert_eq!(request.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(request.multimodal, Some(true));
        assert!(request.settings.is_none());
    }

    #[test]
    fn invalid_request_maps_to_bad_request() {
        assert_eq!(
            status_for(&EndpointError::InvalidRequest("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&EndpointError::Transport {
                status: 500,
                message: "boom".into()
            }),
            StatusCode::BAD_GATEWAY
        );
    }
}
