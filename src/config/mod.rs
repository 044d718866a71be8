mod defaults;
mod types;
mod validation;

pub use defaults::*;
pub use types::*;
pub use validation::*;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level reefchat configuration.
///
/// Loaded once at process start and treated as immutable afterwards;
/// handlers receive it behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_starter_models")]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(find_config_file)
            .unwrap_or_else(|| PathBuf::from("reefchat.json"));

        let mut config = if config_path.exists() {
            info!("Loading config from {}", config_path.display());
            load_config_file(&config_path)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        // Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &str) -> Result<()> {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Look up a configured model by id.
    pub fn model(&self, id: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|model| model.id == id)
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("REEFCHAT_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(bind) = std::env::var("REEFCHAT_BIND") {
            self.server.bind = bind;
        }

        let api_key = std::env::var("OPENAI_API_KEY")
            .or_else(|_| std::env::var("HF_TOKEN"))
            .ok();
        if let Some(key) = api_key {
            for model in &mut self.models {
                if model.endpoint.api_key.is_none() {
                    model.endpoint.api_key = Some(key.clone());
                }
            }
            if self.catalog.token.is_none() {
                self.catalog.token = Some(key);
            }
        }

        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            self.catalog.base_url = base;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            models: default_starter_models(),
            catalog: CatalogConfig::default(),
        }
    }
}

/// A working single-model lineup so `config init` + `serve` run out of the
/// box against the catalog router.
fn default_starter_models() -> Vec<ModelConfig> {
    vec![ModelConfig {
        id: DEFAULT_MODEL.to_string(),
        name: Some("GPT OSS 20B".to_string()),
        provider: None,
        multimodal: false,
        unlisted: false,
        parameters: GenerationSettings::default(),
        endpoint: EndpointConfig {
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            ..EndpointConfig::default()
        },
    }]
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("reefchat.json"),
        PathBuf::from("reefchat.json5"),
        PathBuf::from("reefchat.yaml"),
        PathBuf::from("reefchat.yml"),
        PathBuf::from("reefchat.toml"),
    ];

    for path in &candidates {
        if path.exists() {
            return Some(path.clone());
        }
    }

    // Check home directory
    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".reefchat").join("config.json");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Load configuration from a file path.
fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;

    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        // JSON and JSON5 both land here; relaxed syntax gets the first try.
        _ => json5::from_str(&content).or_else(|_| serde_json::from_str(&content))?,
    };

    Ok(config)
}
