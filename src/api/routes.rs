//! Router assembly, shared state and the server loop.

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use chrono::{SecondsFormat, Utc};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::ai;
use super::error::{method_not_allowed, not_found, panic_response};
use super::types::HealthResponse;
use crate::config::Config;
use crate::llm::{LlmClient, OpenAiClient};
use crate::task::{TaskRunner, TaskStore, SWEEP_INTERVAL};

/// Name reported by the health endpoint.
pub const SERVICE_NAME: &str = "ai-services";

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Executes analysis tasks and owns the task store
    pub runner: TaskRunner,
}

impl AppState {
    /// Build state around an explicit provider client (or none).
    pub fn new(config: Config, llm: Option<Arc<dyn LlmClient>>) -> Self {
        let runner = TaskRunner::new(Arc::new(TaskStore::new()), llm, config.tasks.clone());
        Self { config, runner }
    }

    /// Build state with the OpenAI client described by `config`.
    pub fn from_config(config: Config) -> Self {
        let llm = OpenAiClient::from_config(&config.provider)
            .map(|client| Arc::new(client) as Arc<dyn LlmClient>);
        Self::new(config, llm)
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health))
        .nest("/api/ai", ai::routes())
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    // Credentials forbid wildcards: methods are listed, headers mirror the request.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::mirror_request())
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(config));

    if state.runner.provider_configured() {
        tracing::info!(
            "AI provider configured (model: {})",
            state.config.provider.model
        );
    } else {
        tracing::warn!("OPENAI_API_KEY is not set; analysis tasks will fail until it is configured");
    }

    let sweeper = state.runner.spawn_sweeper(SWEEP_INTERVAL);
    let app = router(Arc::clone(&state));

    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal(shutdown_state).await;
        })
        .await?;

    sweeper.abort();
    Ok(())
}

/// Wait for SIGTERM/SIGINT, then cancel in-flight tasks.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let in_flight = state.runner.store().in_flight().await;
    tracing::info!(
        "Shutdown signal received, cancelling {} in-flight tasks",
        in_flight
    );
    state.runner.shutdown();
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
