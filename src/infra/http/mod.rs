//! HTTP surface: a JSON API consumed by the scheduling frontend.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post, put},
};

pub fn build_router(state: ApiState) -> Router {
    let auth_state = state.clone();

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route(
            "/api/v1/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route("/api/v1/posts/{id}", axum::routing::delete(handlers::delete_post))
        .route(
            "/api/v1/posts/{id}/schedule",
            patch(handlers::reschedule_post),
        )
        .route("/api/v1/posts/{id}/retry", post(handlers::retry_post))
        .route("/api/v1/dispatch/run", post(handlers::run_dispatch))
        .route("/api/v1/sync/{platform}", post(handlers::run_sync))
        .route("/api/v1/history/{platform}", get(handlers::list_history))
        .route("/api/v1/stats/{platform}", get(handlers::channel_stats))
        .route(
            "/api/v1/connections/{platform}",
            put(handlers::put_connection).delete(handlers::delete_connection),
        )
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::service_auth,
        ))
        .with_state(state)
}
