//! OpenAI-compatible wire shapes.
//!
//! Request bodies serialize with `skip_serializing_if` so absent sampling
//! options never reach the provider; some reject unknown-but-null fields.
//! Response shapes default every field because providers disagree on which
//! ones they send (usage-only stream frames, missing deltas, etc).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::GenerationUsage;

// ============================================================================
// Requests
// ============================================================================

/// One `messages[]` entry. `content` is either a plain string or an array of
/// multimodal parts, so it stays a raw `Value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: Value,
}

impl ChatMessage {
    pub(crate) fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_owned(),
            content: Value::String(content.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatCompletionsBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CompletionsBody {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

/// Overlay `extra` onto a serialized request body, last write wins, then
/// re-assert a protected `tool_choice` that no overlay key may replace.
pub(crate) fn merge_body(
    body: Value,
    extra: Option<&Map<String, Value>>,
    protected_tool_choice: Option<&Value>,
) -> Value {
    let mut object = match body {
        Value::Object(object) => object,
        other => return other,
    };
    if let Some(extra) = extra {
        for (key, value) in extra {
            object.insert(key.clone(), value.clone());
        }
    }
    if let Some(tool_choice) = protected_tool_choice {
        object.insert("tool_choice".to_owned(), tool_choice.clone());
    }
    Value::Object(object)
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl From<WireUsage> for GenerationUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionsResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatStreamChunk {
    #[serde(default)]
    pub choices: Vec<ChatStreamChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatStreamChoice {
    #[serde(default)]
    pub delta: Option<ChatStreamDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatStreamDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionsStreamChunk {
    #[serde(default)]
    pub choices: Vec<CompletionsStreamChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionsStreamChoice {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn minimal_body() -> ChatCompletionsBody {
        ChatCompletionsBody {
            model: "openai/gpt-oss-20b".to_owned(),
            messages: vec![ChatMessage::text("user", "hi")],
            stream: true,
            max_tokens: None,
            max_completion_tokens: None,
            stop: None,
            temperature: Some(0.7),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            tools: None,
            tool_choice: None,
        }
    }

    #[test]
    fn absent_options_are_not_serialized() {
        let value = serde_json::to_value(minimal_body()).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "openai/gpt-oss-20b",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true,
                "temperature": 0.7
            })
        );
    }

    #[test]
    fn overlay_overrides_computed_fields() {
        let body = serde_json::to_value(minimal_body()).unwrap();
        let extra = json!({"temperature": 0.1, "seed": 42});
        let merged = merge_body(body, extra.as_object(), None);
        assert_eq!(merged["temperature"], json!(0.1));
        assert_eq!(merged["seed"], json!(42));
        assert_eq!(merged["model"], json!("openai/gpt-oss-20b"));
    }

    #[test]
    fn protected_tool_choice_beats_the_overlay() {
        let body = serde_json::to_value(minimal_body()).unwrap();
        let extra = json!({"tool_choice": "none"});
        let merged = merge_body(body, extra.as_object(), Some(&json!("auto")));
        assert_eq!(merged["tool_choice"], json!("auto"));
    }

    #[test]
    fn unprotected_tool_choice_passes_through() {
        let body = serde_json::to_value(minimal_body()).unwrap();
        let extra = json!({"tool_choice": "none"});
        let merged = merge_body(body, extra.as_object(), None);
        assert_eq!(merged["tool_choice"], json!("none"));
    }

    #[test]
    fn usage_only_stream_frame_parses() {
        let chunk: ChatStreamChunk = serde_json::from_value(json!({
            "usage": {"prompt_tokens": 10, "completion_tokens": 4}
        }))
        .unwrap();
        assert!(chunk.choices.is_empty());
        let usage = GenerationUsage::from(chunk.usage.unwrap());
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 4);
    }

    #[test]
    fn delta_frame_parses_with_missing_content() {
        let chunk: ChatStreamChunk = serde_json::from_value(json!({
            "choices": [{"delta": {}, "finish_reason": "stop"}]
        }))
        .unwrap();
        let choice = &chunk.choices[0];
        assert!(choice.delta.as_ref().unwrap().content.is_none());
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
    }
}
