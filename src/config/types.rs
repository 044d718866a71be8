use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::media::ImageProcessorOptions;

use super::defaults::*;

// ============================================================================
// Server Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

// ============================================================================
// Model Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub id: String,
    /// Display name; falls back to the id.
    pub name: Option<String>,
    /// Inference provider hint for feature gating. Inferred from the id
    /// when absent.
    pub provider: Option<String>,
    #[serde(default)]
    pub multimodal: bool,
    /// Hidden from `GET /api/models` but still callable.
    #[serde(default)]
    pub unlisted: bool,
    #[serde(default)]
    pub parameters: GenerationSettings,
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

impl ModelConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Sampling parameters. Model configs hold the defaults; requests may
/// override any subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

impl GenerationSettings {
    /// Layer request overrides on top of these defaults. Set fields win,
    /// unset fields fall through.
    pub fn overridden_by(&self, overrides: &GenerationSettings) -> GenerationSettings {
        GenerationSettings {
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            stop: overrides.stop.clone().or_else(|| self.stop.clone()),
            frequency_penalty: overrides.frequency_penalty.or(self.frequency_penalty),
            presence_penalty: overrides.presence_penalty.or(self.presence_penalty),
        }
    }
}

// ============================================================================
// Endpoint Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Legacy text completions; the conversation is flattened into a prompt.
    Completions,
    #[default]
    ChatCompletions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Falls back to OPENAI_API_KEY / HF_TOKEN at load time, then to a
    /// placeholder for keyless servers.
    pub api_key: Option<String>,
    #[serde(default)]
    pub completion: CompletionMode,
    /// Handlebars template for `completions` deployments. ChatML when unset.
    pub chat_prompt_template: Option<String>,
    #[serde(default)]
    pub default_headers: IndexMap<String, String>,
    #[serde(default)]
    pub default_query: IndexMap<String, String>,
    /// Raw keys overlaid onto every outbound body, last write wins.
    pub extra_body: Option<Map<String, Value>>,
    #[serde(default)]
    pub multimodal: MultimodalConfig,
    /// Send `max_completion_tokens` instead of `max_tokens`.
    #[serde(default)]
    pub use_completion_tokens: bool,
    #[serde(default = "default_true")]
    pub streaming_supported: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            completion: CompletionMode::default(),
            chat_prompt_template: None,
            default_headers: IndexMap::new(),
            default_query: IndexMap::new(),
            extra_body: None,
            multimodal: MultimodalConfig::default(),
            use_completion_tokens: false,
            streaming_supported: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultimodalConfig {
    #[serde(default)]
    pub image: ImageProcessorOptions,
}

// ============================================================================
// Catalog Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    pub token: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            token: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_bind() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_catalog_base_url() -> String {
    DEFAULT_CATALOG_BASE_URL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_overrides_win_per_field() {
        let defaults = GenerationSettings {
            temperature: Some(0.7),
            top_p: Some(0.9),
            max_tokens: Some(512),
            ..GenerationSettings::default()
        };
        let overrides = GenerationSettings {
            temperature: Some(0.1),
            stop: Some(vec!["<|end|>".to_string()]),
            ..GenerationSettings::default()
        };

        let merged = defaults.overridden_by(&overrides);
        assert_eq!(merged.temperature, Some(0.1));
        assert_eq!(merged.top_p, Some(0.9));
        assert_eq!(merged.max_tokens, Some(512));
        assert_eq!(merged.stop, Some(vec!["<|end|>".to_string()]));
    }

    #[test]
    fn empty_overrides_keep_defaults() {
        let defaults = GenerationSettings {
            temperature: Some(0.7),
            ..GenerationSettings::default()
        };
        let merged = defaults.overridden_by(&GenerationSettings::default());
        assert_eq!(merged, defaults);
    }

    #[test]
    fn completion_mode_parses_snake_case() {
        let mode: CompletionMode = serde_json::from_str(r#""chat_completions""#).unwrap();
        assert_eq!(mode, CompletionMode::ChatCompletions);
        let mode: CompletionMode = serde_json::from_str(r#""completions""#).unwrap();
        assert_eq!(mode, CompletionMode::Completions);
    }

    #[test]
    fn unknown_completion_mode_is_a_parse_error() {
        let result: Result<CompletionMode, _> = serde_json::from_str(r#""responses""#);
        assert!(result.is_err());
    }

    #[test]
    fn endpoint_defaults_point_at_openai() {
        let endpoint = EndpointConfig::default();
        assert_eq!(endpoint.base_url, DEFAULT_OPENAI_BASE_URL);
        assert!(endpoint.streaming_supported);
        assert!(!endpoint.use_completion_tokens);
        assert_eq!(endpoint.completion, CompletionMode::ChatCompletions);
    }
}
