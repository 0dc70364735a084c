pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::{routing::get, Router};
use service_core::middleware::tracing::{http_trace_layer, request_id_middleware};
use std::sync::Arc;

use services::{GroupAggregationEngine, TokenValidationChain};

pub use startup::Application;

#[derive(Clone)]
pub struct AppState {
    pub engine: GroupAggregationEngine,
    pub token_chain: TokenValidationChain,
    /// Scope every bearer token must carry.
    pub required_scope: Arc<str>,
}

pub fn build_router(state: AppState) -> Router {
    let client_only = Router::new()
        .route(
            "/internal/groups/:user_id",
            get(handlers::groups::user_groups),
        )
        .route(
            "/internal/groups/:user_id/:group_id",
            get(handlers::groups::user_group_by_id),
        )
        .route(
            "/internal/external-groups/:user_id",
            get(handlers::groups::user_external_groups),
        )
        .route("/internal/all-groups", get(handlers::groups::all_groups))
        .route("/members/:group_id", get(handlers::groups::members))
        .route_layer(from_fn(middleware::require_client_credentials));

    let authenticated = Router::new()
        .route("/me/groups", get(handlers::groups::my_groups))
        .route("/me/groups/:group_id", get(handlers::groups::my_group_by_id))
        .merge(client_only)
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::bearer_auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .merge(authenticated)
        .route_layer(from_fn(middleware::metrics_middleware))
        .layer(http_trace_layer())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
