//! medassist HTTP Server
//!
//! Axum-based server exposing the consultation agent: multipart chat with
//! image/document uploads, staged file listing and per-session research
//! results.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_runtime::ProviderConfig;
use med_advisor::{
    intake::MAX_UPLOAD_BYTES, research, AdvisorConfig, Collaborators, ConsultationManager,
    ResearchSettings, UploadArea,
};

use crate::handlers::{
    chat_handler, end_session, health_check, list_files, list_models, session_results,
};
use crate::state::AppState;

/// Uploads per chat request
const MAX_FILES_PER_REQUEST: usize = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize LLM provider
    let provider_config = ProviderConfig::from_env()?;
    let provider = provider_config.build()?;

    match provider.health_check().await {
        Ok(true) => {
            tracing::info!("✓ Connected to {}", provider_config.kind);
            if let Ok(models) = provider.list_models().await {
                tracing::info!("  {} models available", models.len());
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not available - consultations will fail", provider_config.kind);
        }
    }

    let config = AdvisorConfig::from_env(
        provider_config.kind.default_agent_model(),
        provider_config.kind.default_decision_model(),
    )?;
    tracing::info!(
        agent_model = %config.agent_model,
        decision_model = %config.decision_model,
        require_research = config.require_research,
        "Advisor configured"
    );

    let pipeline = research::pipeline_from_env(
        provider.clone(),
        ResearchSettings::from_env(&config.agent_model)?,
    );

    let uploads = UploadArea::new(std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into()));
    uploads.ensure_dir().await?;

    let state = AppState {
        provider: provider.clone(),
        consultations: Arc::new(ConsultationManager::new(
            Collaborators::new(provider, pipeline),
            config,
        )),
        uploads,
    };

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 medassist server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                     - Health check");
    tracing::info!("  GET    /api/models                 - List available models");
    tracing::info!("  POST   /api/chat                   - Consultation turn (multipart)");
    tracing::info!("  GET    /api/files                  - Staged uploads");
    tracing::info!("  GET    /api/sessions/{{id}}/results  - Research results");
    tracing::info!("  DELETE /api/sessions/{{id}}          - End consultation");

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Build the router
pub fn app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))

        // Consultation API
        .route("/api/chat", post(chat_handler))
        .route("/api/files", get(list_files))
        .route("/api/sessions/{id}/results", get(session_results))
        .route("/api/sessions/{id}", axum::routing::delete(end_session))

        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES * MAX_FILES_PER_REQUEST))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
