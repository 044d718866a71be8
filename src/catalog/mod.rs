//! Model catalog client and operator maintenance helpers.
//!
//! The catalog is the upstream `/models` listing (HuggingFace router by
//! default). `models list` groups it for inspection; `models sync` turns one
//! provider's slice of it into a `FEATURE_CONFIG` entry inside a YAML values
//! file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::features::{FeatureConfig, KnowledgeBaseFlags, ProviderFlags};

/// Values-file key the sync rewrites.
pub const FEATURE_CONFIG_KEY: &str = "FEATURE_CONFIG";

/// Providers that get an explicit disabled stanza when a sync enables one of
/// their peers. Keeping them listed (off) makes the generated config
/// self-describing.
pub const WELL_KNOWN_PROVIDERS: &[&str] = &[
    "groq",
    "openai",
    "huggingface",
    "together",
    "fireworks",
    "anyscale",
    "perplexity",
];

// ============================================================================
// Catalog Types
// ============================================================================

/// One serving option for a model in the catalog listing.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogProvider {
    #[serde(default)]
    pub provider: String,
}

/// A model as the catalog lists it. Fields beyond the id are best-effort;
/// upstream omits them for some entries.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogModel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub providers: Vec<CatalogProvider>,
}

#[derive(Debug, Deserialize, Default)]
struct CatalogResponse {
    #[serde(default)]
    data: Vec<CatalogModel>,
}

// ============================================================================
// Catalog Client
// ============================================================================

/// Thin client for the catalog `/models` listing.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl CatalogClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(catalog: &CatalogConfig) -> Self {
        Self::new(&catalog.base_url, catalog.token.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the full model listing.
    pub async fn list_models(&self) -> Result<Vec<CatalogModel>> {
        let url = format!("{}/models", self.base_url);
        info!(url = %url, "fetching model catalog");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach catalog at '{url}'"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Failed to fetch models: {status}");
        }

        let listing: CatalogResponse = response
            .json()
            .await
            .context("Catalog returned a malformed model listing")?;

        debug!(count = listing.data.len(), "catalog listing received");
        Ok(listing.data)
    }
}

// ============================================================================
// Grouping and Selection
// ============================================================================

/// Group model ids by serving provider, largest groups first. Models without
/// provider entries land under "unknown".
pub fn group_by_provider(models: &[CatalogModel]) -> IndexMap<String, Vec<String>> {
    let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
    for model in models {
        if model.providers.is_empty() {
            groups
                .entry("unknown".to_string())
                .or_default()
                .push(model.id.clone());
            continue;
        }
        for serving in &model.providers {
            let name = if serving.provider.is_empty() {
                "unknown".to_string()
            } else {
                serving.provider.clone()
            };
            groups.entry(name).or_default().push(model.id.clone());
        }
    }
    groups.sort_by(|_, a, _, b| b.len().cmp(&a.len()));
    groups
}

/// Ids of every model the named provider serves, sorted. The match is a
/// case-insensitive substring so "groq" also catches regional variants.
pub fn models_served_by(models: &[CatalogModel], provider: &str) -> Vec<String> {
    let needle = provider.to_lowercase();
    let mut ids: Vec<String> = models
        .iter()
        .filter(|model| {
            model
                .providers
                .iter()
                .any(|serving| serving.provider.to_lowercase().contains(&needle))
        })
        .map(|model| model.id.clone())
        .collect();
    ids.sort();
    ids
}

/// Build the feature configuration a sync writes: the target provider enabled
/// with every listed model on, each other well-known provider disabled with
/// an empty allowlist, knowledge base off.
pub fn feature_config_enabling(provider: &str, model_ids: &[String]) -> FeatureConfig {
    let target = provider.to_lowercase();

    let mut providers = IndexMap::new();
    let mut models = IndexMap::new();
    for id in model_ids {
        models.insert(id.clone(), true);
    }
    providers.insert(
        target.clone(),
        ProviderFlags {
            enabled: true,
            models,
        },
    );
    for name in WELL_KNOWN_PROVIDERS {
        if *name == target {
            continue;
        }
        providers.insert(name.to_string(), ProviderFlags::default());
    }

    FeatureConfig {
        providers,
        knowledge_base: KnowledgeBaseFlags {
            enabled: false,
            allow_sync: false,
        },
        model_capabilities: IndexMap::new(),
    }
}

/// Pretty JSON rendering of a feature configuration, as it goes into the
/// values file.
pub fn render_feature_config(config: &FeatureConfig) -> Result<String> {
    serde_json::to_string_pretty(&config.to_wire())
        .context("Failed to render feature configuration")
}

// ============================================================================
// Values File Rewrite
// ============================================================================

/// Replace (or insert) the `FEATURE_CONFIG` entry of a YAML values file with
/// the rendering of `config`. The file is round-tripped through serde_yaml,
/// so every other entry survives untouched.
pub fn update_values_file(path: &Path, config: &FeatureConfig) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read values file '{}'", path.display()))?;

    let mut document: serde_yaml::Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Values file '{}' is not valid YAML", path.display()))?;

    let mapping = document
        .as_mapping_mut()
        .with_context(|| format!("Values file '{}' is not a YAML mapping", path.display()))?;

    let rendered = render_feature_config(config)?;
    mapping.insert(
        serde_yaml::Value::String(FEATURE_CONFIG_KEY.to_string()),
        serde_yaml::Value::String(rendered),
    );

    let updated = serde_yaml::to_string(&document)
        .with_context(|| format!("Failed to serialize values file '{}'", path.display()))?;
    std::fs::write(path, updated)
        .with_context(|| format!("Failed to write values file '{}'", path.display()))?;

    info!(path = %path.display(), "values file updated");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
