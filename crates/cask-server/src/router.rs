use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use cask_store::DiskStorage;
use cask_types::Partition;

use crate::handler;
use crate::hooks::ReceiveHook;

/// Shared state of every request handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<DiskStorage>,
    pub hooks: Arc<Vec<Arc<dyn ReceiveHook>>>,
    pub default_mirrors: Arc<Vec<Partition>>,
}

/// Build the axum router with all cask endpoints.
pub fn build_router(state: AppState, max_blob_size: usize) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/blobs", get(handler::list_blobs))
        .route(
            "/v1/blobs/:address",
            get(handler::get_blob).put(handler::put_blob),
        )
        .layer(DefaultBodyLimit::max(max_blob_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
