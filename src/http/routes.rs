use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/session/start", post(handlers::start_session))
        .route("/session/reset", post(handlers::reset_session))
        .route("/session/stop", post(handlers::stop_session))
        .route("/session/text", post(handlers::inject_text))
        // Session queries
        .route("/session/status", get(handlers::session_status))
        .route("/session/history", get(handlers::session_history))
        .route("/session/links", get(handlers::session_links))
        // Document notifications
        .route(
            "/session/documents/:name/begin",
            post(handlers::begin_document),
        )
        .route(
            "/session/documents/:name/summary",
            post(handlers::complete_document),
        )
        .route(
            "/session/documents/:name/abandon",
            post(handlers::abandon_document),
        )
        // Request logging, and CORS for browser-based UI collaborators
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
