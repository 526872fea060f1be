//! HTTP gateway for Brook.
//!
//! Thin REST endpoints for conversations plus the streaming chat turn,
//! built on Axum. The interesting control flow lives in [`session`]; the
//! handlers in [`api`] only translate between HTTP and the controller.

pub mod api;
pub mod session;
pub mod wire;

pub use session::{SessionController, TurnSettings};
pub use wire::WireEvent;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use brook_agent::TitleSummarizer;
use brook_core::store::ConversationStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub controller: Arc<SessionController>,
    pub store: Arc<dyn ConversationStore>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router with ambient HTTP layers.
///
/// CORS is permissive: the reference frontend is served from a different
/// origin and the API carries no credentials.
pub fn build_router(state: SharedState) -> Router {
    api::router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MiB body limit
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Wire up all subsystems from config and start the HTTP server.
pub async fn serve(config: brook_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let store: Arc<dyn ConversationStore> =
        Arc::new(brook_store::SqliteStore::new(&config.database.path).await?);
    let provider = brook_providers::build_from_config(&config);
    let tools = Arc::new(brook_tools::search_registry(
        config.search.api_key.clone(),
        config.search.max_results,
    ));

    let titles = Arc::new(TitleSummarizer::new(
        provider.clone(),
        store.clone(),
        &config.model,
    ));

    let controller = Arc::new(SessionController::new(
        store.clone(),
        provider,
        tools,
        titles,
        TurnSettings {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_rounds: config.agent.max_rounds,
        },
    ));

    let app = build_router(Arc::new(GatewayState { controller, store }));

    info!(addr = %addr, model = %config.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
