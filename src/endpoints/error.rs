//! Endpoint error taxonomy and upstream error classification.
//!
//! Upstream failures arrive as HTTP status plus an opaque body. Bodies are
//! classified here, once, at the transport boundary so callers can match on
//! typed variants instead of scraping strings.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    /// The model was forced to call a tool and failed, or the tool output
    /// could not be parsed. Recoverable by retrying with `tool_choice: auto`.
    #[error("upstream rejected forced tool choice (status {status}): {message}")]
    ToolChoiceRequired { status: u16, message: String },

    #[error("upstream returned status {status}: {message}")]
    Transport { status: u16, message: String },

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("generation cancelled")]
    Cancelled,
}

/// Error codes that identify a failed forced tool call.
const TOOL_CHOICE_CODES: [&str; 2] = ["tool_use_failed", "output_parse_failed"];

/// Substrings (matched case-insensitively against the whole body) that
/// identify the same failure when no structured code is present.
const TOOL_CHOICE_PATTERNS: [&str; 8] = [
    "tool choice is required",
    "tool_choice is required",
    "tool_use_failed",
    "output_parse_failed",
    "parsing failed",
    "could not be parsed",
    "did not call a tool",
    "model did not call a tool",
];

/// Structured error body as produced by OpenAI-compatible servers. Servers
/// disagree on nesting depth, so `error` recurses.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Box<ApiErrorEnvelope>>,
}

impl ApiErrorEnvelope {
    /// Walk nested envelopes looking for a recognized tool-choice code.
    fn has_tool_choice_code(&self, depth: usize) -> bool {
        if let Some(code) = self.code.as_ref().and_then(|c| c.as_str()) {
            if TOOL_CHOICE_CODES.contains(&code) {
                return true;
            }
        }
        match &self.error {
            Some(inner) if depth > 0 => inner.has_tool_choice_code(depth - 1),
            _ => false,
        }
    }

    /// First human-readable message, outermost first.
    fn first_message(&self, depth: usize) -> Option<&str> {
        if let Some(message) = self.message.as_deref() {
            if !message.is_empty() {
                return Some(message);
            }
        }
        match &self.error {
            Some(inner) if depth > 0 => inner.first_message(depth - 1),
            _ => None,
        }
    }
}

/// Classify a non-2xx upstream response into a typed error.
pub fn classify_api_error(status: u16, body: &str) -> EndpointError {
    let envelope: Option<ApiErrorEnvelope> = serde_json::from_str(body).ok();

    let message = envelope
        .as_ref()
        .and_then(|e| e.first_message(5))
        .map(str::to_owned)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("upstream returned status {status} with an empty body")
            } else {
                trimmed.to_owned()
            }
        });

    let coded = envelope
        .as_ref()
        .map(|e| e.has_tool_choice_code(5))
        .unwrap_or(false);
    if coded || matches_tool_choice_pattern(body) {
        return EndpointError::ToolChoiceRequired { status, message };
    }

    EndpointError::Transport { status, message }
}

fn matches_tool_choice_pattern(body: &str) -> bool {
    let lowered = body.to_lowercase();
    TOOL_CHOICE_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
}
