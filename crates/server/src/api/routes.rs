use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::{
    events, handlers, imports,
    middleware::{metrics_middleware, reverse_proxy},
    tasks,
};
use crate::state::AppState;
use webimport_core::config::ServerConfig;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Events
        .route("/events", get(events::query_events))
        // Import sessions
        .route("/imports", post(imports::start_import))
        .route("/imports", get(imports::current_import))
        .route("/imports/{session}", get(imports::get_import))
        .route("/imports/{session}/tasks", get(imports::list_tasks))
        .route("/imports/{session}/tasks/{id}", get(imports::get_task))
        // Task commands
        .route("/imports/{session}/tasks/{id}/candidate", put(tasks::choose_candidate))
        .route("/imports/{session}/tasks/{id}/skip", put(tasks::skip))
        .route("/imports/{session}/tasks/{id}/search-id", put(tasks::search_id))
        .route("/imports/{session}/tasks/{id}/search-name", put(tasks::search_name))
        .route("/imports/{session}/tasks/{id}/as-is", put(tasks::as_is))
        .route("/imports/{session}/tasks/{id}/as-tracks", put(tasks::as_tracks))
        .route("/imports/{session}/tasks/{id}/check-duplicates", put(tasks::check_duplicates))
        .route("/imports/{session}/tasks/{id}/resolve-duplicates", put(tasks::resolve_duplicates))
        .route("/imports/{session}/tasks/{id}/apply", put(tasks::apply))
        .route("/imports/{session}/tasks/{id}/finalize", put(tasks::finalize))
        .with_state(Arc::clone(&state));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(Arc::clone(&state))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http());

    let server = &state.config().server;
    let router = match cors_layer(server) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    // The prefix has to be gone before routing, so the rewrite wraps the
    // whole router instead of being one of its layers.
    if server.reverse_proxy {
        Router::new()
            .fallback_service(router)
            .layer(middleware::from_fn(reverse_proxy))
    } else {
        router
    }
}

/// CORS for the configured origins, or `None` when none are configured.
fn cors_layer(server: &ServerConfig) -> Option<CorsLayer> {
    if server.cors.is_empty() {
        return None;
    }
    info!(origins = ?server.cors, "Enabling CORS");

    let origin = if server.cors.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = server
            .cors
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(server.cors_supports_credentials),
    )
}
