use axum::{
    routing::{get, post, put},
    Router,
};

use super::{handlers, state::ServerState};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates the router with every API endpoint.
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/sandboxes",
            post(handlers::create_handler)
                .get(handlers::list_handler)
                .delete(handlers::kill_all_handler),
        )
        .route(
            "/sandboxes/{id}",
            get(handlers::get_handler).delete(handlers::kill_handler),
        )
        .route("/sandboxes/{id}/pause", post(handlers::pause_handler))
        .route("/sandboxes/{id}/resume", post(handlers::resume_handler))
        .route("/sandboxes/{id}/timeout", post(handlers::timeout_handler))
        .route("/sandboxes/{id}/refreshes", post(handlers::refresh_handler))
        .route("/sandboxes/{id}/metadata", put(handlers::metadata_handler))
        .with_state(state)
}
