use axum::{routing::get, Router};

use crate::handler::{self, StatusState};

/// Build the axum router with all status endpoints.
pub fn build_router(state: StatusState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/peers", get(handler::peers_handler))
        .route("/v1/topics", get(handler::topics_handler))
        .with_state(state)
}
