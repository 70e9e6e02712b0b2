pub mod chat;
pub mod documents;
pub mod health;
pub mod sessions;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{middleware::request_logger, state::AppState};

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors(&state.config.config.cors.allowed_origins);
    let body_limit = state.config.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logger))
                .layer(cors),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}

fn api_v1_routes() -> Router<AppState> {
    // The event stream stays outside the compressed group.
    let json_routes = Router::new()
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).delete(sessions::reset_session),
        )
        .route("/sessions/{id}/settings", put(sessions::update_settings))
        .route("/sessions/{id}/history", get(sessions::get_history))
        .route("/sessions/{id}/documents", post(documents::upload_documents))
        .route("/sessions/{id}/search", post(documents::search_documents))
        .route("/sessions/{id}/chat", post(chat::chat_handler))
        .layer(CompressionLayer::new());

    Router::new()
        .merge(json_routes)
        .route("/sessions/{id}/chat/stream", post(chat::chat_stream_handler))
}
