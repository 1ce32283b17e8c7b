//! HTTP routes for the diagnosis server.

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};

use crate::sse::repo_diagnostic_handler;
use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new().route("/repoDiagnostic", get(repo_diagnostic_handler))
}

/// Full application: health check at the root, API under `/api`, permissive CORS.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .nest("/api", api_router())
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn banner() -> &'static str {
    "diagnose-server: GET /api/repoDiagnostic?org=<org>&name=<name>"
}
