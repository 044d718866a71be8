//! Feature gating for models and providers.
//!
//! An operator can supply a `FEATURE_CONFIG` value (JSON or JSON5) that
//! controls which models are served. When the value is absent the gate runs
//! open and every model is allowed; when it is present the gate runs strict
//! and only explicitly enabled provider/model pairs pass.

mod defaults;

pub use defaults::default_feature_config;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

// ============================================================================
// Feature Configuration Types
// ============================================================================

/// Capability flags advertised for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelCapabilities {
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub code_interpreter: bool,
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub audio: bool,
}

/// Per-provider switch plus the model allowlist behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFlags {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub models: IndexMap<String, bool>,
}

/// Knowledge base toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseFlags {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_sync: bool,
}

/// The resolved feature configuration.
///
/// Provider entries keep the order the configuration listed them in; the
/// fallback scan in [`FeatureGate::is_model_enabled`] depends on it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureConfig {
    pub providers: IndexMap<String, ProviderFlags>,
    pub knowledge_base: KnowledgeBaseFlags,
    pub model_capabilities: IndexMap<String, ModelCapabilities>,
}

impl FeatureConfig {
    /// Render as the flat wire shape: provider entries at the top level,
    /// followed by `knowledgeBase` and `modelCapabilities`. An empty
    /// capability table is omitted entirely, so a rendered config merged
    /// over the defaults leaves the built-in capabilities alone.
    pub fn to_wire(&self) -> IndexMap<String, serde_json::Value> {
        let mut wire = IndexMap::new();
        for (name, flags) in &self.providers {
            wire.insert(
                name.clone(),
                serde_json::to_value(flags).unwrap_or(serde_json::Value::Null),
            );
        }
        wire.insert(
            "knowledgeBase".to_string(),
            serde_json::to_value(self.knowledge_base).unwrap_or(serde_json::Value::Null),
        );
        if !self.model_capabilities.is_empty() {
            wire.insert(
                "modelCapabilities".to_string(),
                serde_json::to_value(&self.model_capabilities).unwrap_or(serde_json::Value::Null),
            );
        }
        wire
    }
}

/// Wire form of a feature configuration overlay. Provider entries live at the
/// top level next to the two reserved keys, so everything that is not
/// `knowledgeBase` or `modelCapabilities` is treated as a provider.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FeatureConfigWire {
    #[serde(default)]
    knowledge_base: Option<KnowledgeBaseFlags>,
    #[serde(default)]
    model_capabilities: Option<IndexMap<String, ModelCapabilities>>,
    #[serde(flatten)]
    providers: IndexMap<String, ProviderFlags>,
}

// ============================================================================
// Feature Gate
// ============================================================================

/// Whether the gate restricts models or waves everything through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// No feature configuration supplied: every model is allowed.
    Open,
    /// A feature configuration was supplied: only listed models are allowed.
    Strict,
}

/// The model gate. Built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct FeatureGate {
    mode: GateMode,
    config: FeatureConfig,
}

impl FeatureGate {
    /// Build the gate from the `FEATURE_CONFIG` environment variable.
    pub fn from_env() -> Self {
        let raw = std::env::var("FEATURE_CONFIG").ok();
        Self::from_env_value(raw.as_deref())
    }

    /// Build the gate from a raw configuration value.
    ///
    /// An absent or blank value opens the gate. A present value switches to
    /// strict mode; its parsed content is merged over the built-in defaults
    /// at the top level, so a provider entry wholly replaces the default
    /// entry of the same name. A value that fails to parse still switches to
    /// strict mode, gating on the untouched defaults.
    pub fn from_env_value(raw: Option<&str>) -> Self {
        let trimmed = raw.map(str::trim).unwrap_or("");

        if trimmed.is_empty() {
            info!("no feature config set, all models allowed");
            return Self {
                mode: GateMode::Open,
                config: default_feature_config(),
            };
        }

        match parse_wire(trimmed) {
            Ok(overlay) => {
                let config = merge_overlay(default_feature_config(), overlay);
                info!(
                    providers = config.providers.len(),
                    "loaded feature config from environment"
                );
                Self {
                    mode: GateMode::Strict,
                    config,
                }
            }
            Err(err) => {
                error!(error = %err, "failed to parse feature config, using defaults");
                Self {
                    mode: GateMode::Strict,
                    config: default_feature_config(),
                }
            }
        }
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Decide whether a model may be served.
    ///
    /// In strict mode the provider hint is consulted first: a disabled
    /// provider blocks its models outright, and an enabled provider only
    /// serves models its list marks `true`. Without a usable hint every
    /// enabled provider is scanned in configuration order and the first one
    /// listing the model decides.
    pub fn is_model_enabled(&self, model_id: &str, provider: Option<&str>) -> bool {
        if self.mode == GateMode::Open {
            return true;
        }

        if let Some(provider) = provider {
            let key = provider.to_lowercase();
            if let Some(flags) = self.config.providers.get(&key) {
                if !flags.enabled {
                    debug!(model_id, provider, "model disabled: provider is disabled");
                    return false;
                }
                return match flags.models.get(model_id) {
                    Some(enabled) => {
                        debug!(
                            model_id,
                            provider,
                            enabled = *enabled,
                            "model found in provider config"
                        );
                        *enabled
                    }
                    None => {
                        debug!(
                            model_id,
                            provider, "model disabled: not in provider's model list"
                        );
                        false
                    }
                };
            }
        }

        // No hint, or the hinted provider is not configured: scan everything.
        for (name, flags) in &self.config.providers {
            if !flags.enabled {
                continue;
            }
            if let Some(enabled) = flags.models.get(model_id) {
                debug!(
                    model_id,
                    provider = name.as_str(),
                    enabled = *enabled,
                    "model found in provider config (fallback)"
                );
                return *enabled;
            }
        }

        debug!(model_id, "model disabled: not found in any provider config");
        false
    }

    /// Capability flags for a model, if the configuration declares any.
    pub fn model_capabilities(&self, model_id: &str) -> Option<ModelCapabilities> {
        self.config.model_capabilities.get(model_id).copied()
    }

    pub fn knowledge_base_enabled(&self) -> bool {
        self.config.knowledge_base.enabled
    }

    pub fn knowledge_base_sync_allowed(&self) -> bool {
        self.config.knowledge_base.allow_sync
    }
}

fn parse_wire(raw: &str) -> Result<FeatureConfigWire, json5::Error> {
    // JSON5 first, plain JSON as a fallback for inputs json5 chokes on.
    json5::from_str(raw).or_else(|e| serde_json::from_str(raw).map_err(|_| e))
}

fn merge_overlay(mut base: FeatureConfig, overlay: FeatureConfigWire) -> FeatureConfig {
    for (name, flags) in overlay.providers {
        base.providers.insert(name.to_lowercase(), flags);
    }
    if let Some(kb) = overlay.knowledge_base {
        base.knowledge_base = kb;
    }
    if let Some(caps) = overlay.model_capabilities {
        base.model_capabilities = caps;
    }
    base
}

// ============================================================================
// Provider Inference
// ============================================================================

/// Guess the serving provider from a model id.
///
/// A fallback for callers that did not record the provider; the catalog is
/// the authoritative source when it is available.
pub fn infer_provider_from_model_id(model_id: &str) -> Option<&'static str> {
    let id = model_id.to_lowercase();

    if id.contains("gpt-oss")
        || id.contains("llama-3")
        || id.contains("llama-4")
        || id.contains("qwen")
        || id.contains("kimi")
        || id.contains("whisper")
    {
        return Some("groq");
    }

    if id.starts_with("gpt-") {
        return Some("openai");
    }

    // Namespaced ids default to the HF router.
    if id.contains('/') {
        return Some("huggingface");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict(raw: &str) -> FeatureGate {
        let gate = FeatureGate::from_env_value(Some(raw));
        assert_eq!(gate.mode(), GateMode::Strict);
        gate
    }

    // ========================================================================
    // Open Mode
    // ========================================================================

    #[test]
    fn test_unset_allows_everything() {
        let gate = FeatureGate::from_env_value(None);
        assert_eq!(gate.mode(), GateMode::Open);
        assert!(gate.is_model_enabled("gpt-4o", Some("openai")));
        assert!(gate.is_model_enabled("totally-unknown-model", None));
    }

    #[test]
    fn test_blank_value_allows_everything() {
        let gate = FeatureGate::from_env_value(Some("   \n\t  "));
        assert_eq!(gate.mode(), GateMode::Open);
        assert!(gate.is_model_enabled("anything", Some("nowhere")));
    }

    #[test]
    fn test_open_mode_still_serves_default_capabilities() {
        let gate = FeatureGate::from_env_value(None);
        let caps = gate.model_capabilities("gpt-4o").unwrap();
        assert!(caps.web_search && caps.code_interpreter && caps.vision);
        assert!(!caps.audio);
    }

    // ========================================================================
    // Strict Mode
    // ========================================================================

    #[test]
    fn test_listed_model_under_enabled_provider() {
        let gate = strict(r#"{"groq": {"enabled": true, "models": {"m1": true, "m2": false}}}"#);
        assert!(gate.is_model_enabled("m1", Some("groq")));
        assert!(!gate.is_model_enabled("m2", Some("groq")));
        assert!(!gate.is_model_enabled("m3", Some("groq")));
    }

    #[test]
    fn test_disabled_provider_blocks_listed_models() {
        let gate = strict(r#"{"groq": {"enabled": false, "models": {"m1": true}}}"#);
        assert!(!gate.is_model_enabled("m1", Some("groq")));
    }

    #[test]
    fn test_unknown_provider_hint_falls_back_to_scan() {
        let gate = strict(r#"{"groq": {"enabled": true, "models": {"m1": true}}}"#);
        assert!(gate.is_model_enabled("m1", Some("router")));
        assert!(gate.is_model_enabled("m1", None));
    }

    #[test]
    fn test_fallback_scan_skips_disabled_providers() {
        // The default openai entry is disabled, so its models never pass
        // through the fallback scan.
        let gate = strict(r#"{"groq": {"enabled": true, "models": {"m1": true}}}"#);
        assert!(!gate.is_model_enabled("gpt-4o", None));
    }

    #[test]
    fn test_fallback_scan_first_listing_wins() {
        let gate = strict(
            r#"{
                "alpha": {"enabled": true, "models": {"m1": false}},
                "beta": {"enabled": true, "models": {"m1": true}}
            }"#,
        );
        // alpha lists the model first; its `false` is final even though beta
        // would have allowed it.
        assert!(!gate.is_model_enabled("m1", None));
    }

    #[test]
    fn test_provider_lookup_is_case_insensitive() {
        let gate = strict(r#"{"GROQ": {"enabled": true, "models": {"m1": true}}}"#);
        assert!(gate.is_model_enabled("m1", Some("Groq")));
        assert!(gate.is_model_enabled("m1", Some("groq")));
    }

    #[test]
    fn test_provider_entry_without_models_blocks() {
        let gate = strict(r#"{"groq": {"enabled": true}}"#);
        assert!(!gate.is_model_enabled("m1", Some("groq")));
    }

    #[test]
    fn test_json5_relaxed_syntax_accepted() {
        let gate = strict("{groq: {enabled: true, models: {'m1': true,}},}");
        assert!(gate.is_model_enabled("m1", Some("groq")));
    }

    #[test]
    fn test_malformed_value_stays_strict_on_defaults() {
        let gate = strict("{this is not json");
        // Defaults: groq enabled, openai disabled.
        assert!(gate.is_model_enabled("openai/gpt-oss-120b", Some("groq")));
        assert!(!gate.is_model_enabled("gpt-4o", Some("openai")));
        assert!(!gate.is_model_enabled("unlisted", None));
    }

    // ========================================================================
    // Merge Semantics
    // ========================================================================

    #[test]
    fn test_overlay_replaces_provider_entry_wholesale() {
        let gate = strict(r#"{"groq": {"enabled": true, "models": {"only-this": true}}}"#);
        // The default groq model list is gone, not merged.
        assert!(!gate.is_model_enabled("llama-3.3-70b-versatile", Some("groq")));
        assert!(gate.is_model_enabled("only-this", Some("groq")));
        // Untouched default entries survive.
        assert!(gate.config().providers.contains_key("openai"));
    }

    #[test]
    fn test_overlay_appends_new_providers_after_defaults() {
        let gate = strict(r#"{"router": {"enabled": true, "models": {"m1": true}}}"#);
        let names: Vec<&str> = gate
            .config()
            .providers
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(names, vec!["groq", "openai", "router"]);
    }

    #[test]
    fn test_overlay_keeps_default_capabilities_when_absent() {
        let gate = strict(r#"{"groq": {"enabled": true, "models": {}}}"#);
        assert!(gate.model_capabilities("whisper-large-v3").unwrap().audio);
    }

    #[test]
    fn test_overlay_replaces_capabilities_when_present() {
        let gate = strict(
            r#"{"modelCapabilities": {"m1": {"vision": true}}}"#,
        );
        assert!(gate.model_capabilities("m1").unwrap().vision);
        assert!(!gate.model_capabilities("m1").unwrap().web_search);
        assert!(gate.model_capabilities("gpt-4o").is_none());
    }

    #[test]
    fn test_knowledge_base_flags() {
        let open = FeatureGate::from_env_value(None);
        assert!(!open.knowledge_base_enabled());
        assert!(!open.knowledge_base_sync_allowed());

        let gate = strict(r#"{"knowledgeBase": {"enabled": true, "allowSync": true}}"#);
        assert!(gate.knowledge_base_enabled());
        assert!(gate.knowledge_base_sync_allowed());
    }

    #[test]
    fn test_reserved_keys_are_not_providers() {
        let gate = strict(r#"{"knowledgeBase": {"enabled": true}}"#);
        assert!(!gate.config().providers.contains_key("knowledgebase"));
    }

    // ========================================================================
    // Wire Shape
    // ========================================================================

    #[test]
    fn test_to_wire_orders_providers_first() {
        let config = default_feature_config();
        let wire = config.to_wire();
        let keys: Vec<&str> = wire.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["groq", "openai", "knowledgeBase", "modelCapabilities"]
        );
        assert_eq!(wire["groq"]["enabled"], serde_json::json!(true));
        assert_eq!(wire["knowledgeBase"]["allowSync"], serde_json::json!(false));
    }

    // ========================================================================
    // Provider Inference
    // ========================================================================

    #[test]
    fn test_infer_provider_groq_patterns() {
        assert_eq!(infer_provider_from_model_id("openai/gpt-oss-120b"), Some("groq"));
        assert_eq!(infer_provider_from_model_id("llama-3.3-70b-versatile"), Some("groq"));
        assert_eq!(
            infer_provider_from_model_id("meta-llama/llama-4-scout-17b-16e-instruct"),
            Some("groq")
        );
        assert_eq!(infer_provider_from_model_id("Qwen/Qwen3-32B"), Some("groq"));
        assert_eq!(
            infer_provider_from_model_id("moonshotai/kimi-k2-instruct-0905"),
            Some("groq")
        );
        assert_eq!(infer_provider_from_model_id("whisper-large-v3"), Some("groq"));
    }

    #[test]
    fn test_infer_provider_openai_prefix() {
        assert_eq!(infer_provider_from_model_id("gpt-4o"), Some("openai"));
        assert_eq!(infer_provider_from_model_id("GPT-4-turbo"), Some("openai"));
    }

    #[test]
    fn test_infer_provider_namespaced_default() {
        assert_eq!(
            infer_provider_from_model_id("mistralai/Mixtral-8x7B"),
            Some("huggingface")
        );
    }

    #[test]
    fn test_infer_provider_unknown() {
        assert_eq!(infer_provider_from_model_id("mistral-large"), None);
        assert_eq!(infer_provider_from_model_id("claude-sonnet"), None);
    }
}
