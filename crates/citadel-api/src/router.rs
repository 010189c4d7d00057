//! Axum router construction for the HTTP bridge.
//!
//! Assembles all routes into a single [`Router`] with CORS and request
//! tracing middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for the bridge.
///
/// The router includes:
/// - `GET /api/health` -- liveness and claim count
/// - `POST /api/events` -- decide a host event
/// - `POST /api/claims` -- create a claim
/// - `GET|DELETE /api/claims/{id}` -- fetch or remove a claim
/// - `POST /api/claims/{id}/reinforce` -- re-reinforce a claim
/// - `PUT|DELETE /api/claims/{id}/access` -- grant or revoke access
/// - `PUT /api/claims/{id}/insecure` -- toggle automation access
/// - `GET /api/claims/{id}/audit` -- recent audit entries
/// - `GET /api/lookup` -- point lookup
/// - `GET /api/region` -- region query
/// - `GET /api/chunks` -- chunks holding stored claims
/// - `POST /api/chunks/load` -- index one chunk's claims
/// - `PUT /api/groups/{id}/members` -- membership sync
/// - `DELETE /api/groups/{id}` -- group deletion
/// - `PUT /api/groups/availability` -- mark the group mirror (un)available
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        // Host events
        .route("/api/events", post(handlers::decide_event))
        // Claims
        .route("/api/claims", post(handlers::create_claim))
        .route(
            "/api/claims/{id}",
            get(handlers::get_claim).delete(handlers::remove_claim),
        )
        .route("/api/claims/{id}/reinforce", post(handlers::reinforce_claim))
        .route(
            "/api/claims/{id}/access",
            put(handlers::set_access).delete(handlers::revoke_access),
        )
        .route("/api/claims/{id}/insecure", put(handlers::set_insecure))
        .route("/api/claims/{id}/audit", get(handlers::claim_audit))
        .route("/api/lookup", get(handlers::lookup))
        .route("/api/region", get(handlers::region))
        .route("/api/chunks", get(handlers::populated_chunks))
        .route("/api/chunks/load", post(handlers::load_chunk))
        // Group sync
        .route("/api/groups/availability", put(handlers::set_availability))
        .route(
            "/api/groups/{id}/members",
            put(handlers::sync_group_members),
        )
        .route(
            "/api/groups/{id}",
            axum::routing::delete(handlers::delete_group),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
