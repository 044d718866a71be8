use crate::features::{infer_provider_from_model_id, ModelCapabilities};
use crate::server::{chat, AppState};

use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build all routes for the serve surface.
pub fn build_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/api/health", get(health_handler))
        // Model listing
        .route("/api/models", get(models_handler))
        // Chat stream
        .route("/api/chat", post(chat::chat_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime: u64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
        uptime,
    })
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    multimodal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    capabilities: Option<ModelCapabilities>,
}

/// List the models this deployment serves: configured, listed and allowed by
/// the feature gate.
async fn models_handler(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    let models = state
        .config
        .models
        .iter()
        .filter(|model| !model.unlisted)
        .filter(|model| {
            let provider = model
                .provider
                .as_deref()
                .or_else(|| infer_provider_from_model_id(&model.id));
            state.gate.is_model_enabled(&model.id, provider)
        })
        .map(|model| ModelInfo {
            id: model.id.clone(),
            name: model.display_name().to_string(),
            provider: model.provider.clone(),
            multimodal: model.multimodal,
            capabilities: state.gate.model_capabilities(&model.id),
        })
        .collect();
    Json(models)
}
