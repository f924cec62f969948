//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, health, records, usage};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for raw record endpoints.
/// Writes hold row locks, so this bounds how many can queue on one row.
const RECORDS_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/usage/price_limit` - Subscriptions over a price limit
/// - `GET /v1/usage/usage_metrics/{subscription_id}` - Totals for one subscription
/// - `GET /v1/records` - List raw records
/// - `GET /v1/records/{id}` - Get a raw record
///
/// ## Records (Service API Key auth, rate-limited)
/// - `POST /v1/records/{data|voice}` - Record usage
/// - `PUT /v1/records/{id}` - Replace a raw record
/// - `DELETE /v1/records/{id}` - Delete a raw record
///
/// ## Admin (Admin API Key auth)
/// - `POST /v1/admin/aggregates/rebuild` - Recompute the rollup
/// - `GET /v1/admin/aggregates/audit` - Compare the rollup with raw records
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // `:id` names the usage type (`data` or `voice`) on POST and a record
    // id on every other method.
    let record_routes = Router::new()
        .route("/", get(records::list_records))
        .route(
            "/:id",
            post(records::create_record)
                .get(records::get_record)
                .put(records::update_record)
                .delete(records::delete_record),
        )
        .layer(ConcurrencyLimitLayer::new(RECORDS_MAX_CONCURRENT_REQUESTS));

    let usage_routes = Router::new()
        .route("/price_limit", get(usage::price_limit))
        .route("/usage_metrics/:subscription_id", get(usage::usage_metrics));

    let admin_routes = Router::new()
        .route("/aggregates/rebuild", post(admin::rebuild_aggregates))
        .route("/aggregates/audit", get(admin::audit_aggregates));

    let api_routes = Router::new()
        .nest("/usage", usage_routes)
        .nest("/admin", admin_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .nest("/records", record_routes);

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
