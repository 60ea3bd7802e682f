//! Patient Simulator - LLM-driven patients for clinical training
//!
//! A Rust backend implementing a dialog policy state machine: each doctor
//! message is classified, routed through disclosure or treatment evaluation,
//! and answered in character by a language model.

mod api;
mod catalog;
mod disclosure;
mod intent;
mod llm;
mod responder;
mod runtime;
mod state_machine;
mod treatment;

use api::{create_router, AppState};
use catalog::Catalog;
use llm::{LlmConfig, ModelRegistry};
use runtime::{ConversationManager, RegistryTextGenerator, RuntimeConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patient_sim=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = std::env::var("PATIENT_SIM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let runtime_config = RuntimeConfig::from_env();

    // Initialize LLM registry
    let llm_config = LlmConfig::from_env();
    let llm_registry = Arc::new(ModelRegistry::new(&llm_config));

    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            patient_model = %llm_registry.patient_model_id(),
            classifier_model = %llm_registry.classifier_model_id(),
            "LLM registry initialized"
        );
    } else {
        tracing::warn!("No LLM API keys configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.");
    }

    let catalog = Arc::new(Catalog::builtin());
    tracing::info!(
        conditions = ?catalog.names(),
        timeout_secs = runtime_config.llm_timeout.as_secs(),
        min_symptoms = runtime_config.min_symptoms,
        max_symptoms = runtime_config.max_symptoms,
        "Catalog loaded"
    );

    // Create application state
    let generator = Arc::new(RegistryTextGenerator::new(llm_registry.clone()));
    let manager = Arc::new(ConversationManager::new(catalog, generator, runtime_config));
    let state = AppState::new(manager, llm_registry);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Patient simulator listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
