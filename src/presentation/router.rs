// Route table and cross-cutting HTTP layers
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_metric, get_screen, health_check, save_screen};
use crate::presentation::live::{stream_chunked, ws_data, ws_screen, ws_topic};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    // Live responses are framed per message, so only the REST routes are
    // compressed as a whole.
    let rest = Router::new()
        .route("/api/screens", post(save_screen))
        .route("/api/screens/:code", get(get_screen))
        .route("/api/data/:source", get(get_metric))
        .layer(CompressionLayer::new());

    let live = Router::new()
        .route("/api/screens/:code/live", get(ws_screen))
        .route("/api/stream", get(stream_chunked))
        .route("/ws/data", get(ws_data))
        .route("/ws/data/:topic", get(ws_topic));

    Router::new()
        .route("/healthz", get(health_check))
        .merge(rest)
        .merge(live)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// Any origin, credentials allowed. A wildcard cannot be combined with
/// credentials, so the request's own origin is echoed back.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
