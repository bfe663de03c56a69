// Route modules
pub mod subscriptions;

use crate::{
    app_state::AppState,
    middleware::{jwt_auth_middleware, logging_middleware},
};
use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.application.cors_allowed_origins);

    Router::new()
        .nest("/api/v1", api_v1_routes(state.clone()))
        .layer(cors)
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(state: AppState) -> Router<AppState> {
    // All subscription routes require a valid bearer token
    let protected_routes = Router::new()
        .route("/subscriptions/verify", post(subscriptions::verify_subscription))
        .route("/subscriptions/me", get(subscriptions::current_subscription))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    protected_routes.layer(middleware::from_fn(logging_middleware))
}

/// CORS from the configured allow-list. An empty list means same-origin
/// only; no wildcard fallback.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
