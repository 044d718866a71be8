use indexmap::IndexMap;

use super::{FeatureConfig, KnowledgeBaseFlags, ModelCapabilities, ProviderFlags};

/// The built-in feature configuration.
///
/// Groq carries the default chat lineup. The OpenAI entry ships disabled and
/// only documents which models would light up if an operator switched it on.
pub fn default_feature_config() -> FeatureConfig {
    let mut providers = IndexMap::new();

    providers.insert(
        "groq".to_string(),
        ProviderFlags {
            enabled: true,
            models: model_list(&[
                // Reasoning
                "openai/gpt-oss-120b",
                "openai/gpt-oss-20b",
                // Text chat
                "llama-3.3-70b-versatile",
                "llama-3.1-8b-instant",
                "qwen/qwen3-32b",
                "moonshotai/kimi-k2-instruct-0905",
                // Vision
                "meta-llama/llama-4-maverick-17b-128e-instruct",
                "meta-llama/llama-4-scout-17b-16e-instruct",
                // Audio
                "whisper-large-v3",
                "whisper-large-v3-turbo",
            ]),
        },
    );

    providers.insert(
        "openai".to_string(),
        ProviderFlags {
            enabled: false,
            models: model_list(&["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"]),
        },
    );

    let mut model_capabilities = IndexMap::new();
    for id in ["gpt-4o", "gpt-4o-mini"] {
        model_capabilities.insert(id.to_string(), caps(true, true, true, false));
    }
    for id in ["openai/gpt-oss-120b", "openai/gpt-oss-20b"] {
        model_capabilities.insert(id.to_string(), caps(true, true, false, false));
    }
    for id in [
        "llama-3.3-70b-versatile",
        "llama-3.1-8b-instant",
        "qwen/qwen3-32b",
        "moonshotai/kimi-k2-instruct-0905",
    ] {
        model_capabilities.insert(id.to_string(), caps(false, false, false, false));
    }
    for id in [
        "meta-llama/llama-4-maverick-17b-128e-instruct",
        "meta-llama/llama-4-scout-17b-16e-instruct",
    ] {
        model_capabilities.insert(id.to_string(), caps(false, false, true, false));
    }
    for id in ["whisper-large-v3", "whisper-large-v3-turbo"] {
        model_capabilities.insert(id.to_string(), caps(false, false, false, true));
    }

    FeatureConfig {
        providers,
        knowledge_base: KnowledgeBaseFlags {
            enabled: false,
            allow_sync: false,
        },
        model_capabilities,
    }
}

fn model_list(ids: &[&str]) -> IndexMap<String, bool> {
    ids.iter().map(|id| (id.to_string(), true)).collect()
}

fn caps(web_search: bool, code_interpreter: bool, vision: bool, audio: bool) -> ModelCapabilities {
    ModelCapabilities {
        web_search,
        code_interpreter,
        vision,
        audio,
    }
}
