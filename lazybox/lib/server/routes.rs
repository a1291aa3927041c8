//! Route definitions for the control API.

use axum::{
    routing::{get, post},
    Router,
};

use super::{handlers, state::ServerState};

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates a new router with all control API endpoints configured
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route(
            "/sandboxes",
            post(handlers::provision_handler).get(handlers::list_handler),
        )
        .route("/sandboxes/start", post(handlers::start_handler))
        .route("/sandboxes/idle-check", post(handlers::idle_check_handler))
        .route("/sandboxes/{uuid}", get(handlers::show_handler))
        .route(
            "/starting/{registry}/{service}",
            get(handlers::starting_page_handler),
        )
        .route("/health", get(handlers::health_handler))
        .with_state(state)
}
