//! HTTP API layer with Axum routes for object storage.
//!
//! This crate provides:
//! - REST routes under `/api`
//! - Request extractors
//! - Error responses

pub mod error;
pub mod extractors;
pub mod routes;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use smarthub_core::storage::StorageService;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Storage registry.
    pub storage: Arc<StorageService>,
}

/// Creates the main application router.
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .nest("/api", routes::api_routes())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
