use std::collections::HashSet;

use anyhow::Result;

use super::Config;

/// Validation errors for configuration.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate a configuration object.
pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    // Validate server port
    if config.server.port == 0 {
        errors.push(ConfigValidationError {
            path: "server.port".to_string(),
            message: "Port must be greater than 0".to_string(),
        });
    }

    // Validate models
    let mut seen = HashSet::new();
    for model in &config.models {
        if model.id.trim().is_empty() {
            errors.push(ConfigValidationError {
                path: "models".to_string(),
                message: "Model id is required".to_string(),
            });
            continue;
        }
        if !seen.insert(model.id.as_str()) {
            errors.push(ConfigValidationError {
                path: format!("models.{}", model.id),
                message: "Duplicate model id".to_string(),
            });
        }
        if model.endpoint.base_url.is_empty() {
            errors.push(ConfigValidationError {
                path: format!("models.{}.endpoint.baseUrl", model.id),
                message: "Endpoint base URL is required".to_string(),
            });
        }
    }

    // Validate catalog
    if config.catalog.base_url.is_empty() {
        errors.push(ConfigValidationError {
            path: "catalog.baseUrl".to_string(),
            message: "Catalog base URL is required".to_string(),
        });
    }

    errors
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}
