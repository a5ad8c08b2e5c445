//! HTTP API
//!
//! The transport layer: an axum router mapping the share endpoints onto the
//! text and file services.
//!
//! ## Routes
//!
//! ```text
//! GET  /                          liveness
//! POST /api/text/share            form: message        -> receipt
//! GET  /api/text/{pin}                                 -> {message}
//! POST /api/text/{pin}            form: message        -> {status}
//! POST /api/file/share            multipart: files[]   -> receipt
//! GET  /api/file/{pin}                                 -> {files, expires_in_min}
//! GET  /api/file/{pin}/all                             -> zip
//! GET  /api/file/{pin}/{filename}                      -> file bytes
//! ```

pub mod handlers;

pub use handlers::ApiError;

use crate::services::{FileService, TextService};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub text: Arc<TextService>,
    pub files: Arc<FileService>,
}

impl AppState {
    pub fn new(text: TextService, files: FileService) -> Self {
        Self {
            text: Arc::new(text),
            files: Arc::new(files),
        }
    }
}

/// Builds the router. `max_body_bytes` caps request bodies (uploads).
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/text/share", post(handlers::share_text))
        .route(
            "/api/text/:pin",
            get(handlers::fetch_text).post(handlers::replace_text),
        )
        .route("/api/file/share", post(handlers::share_files))
        .route("/api/file/:pin", get(handlers::list_files))
        .route("/api/file/:pin/all", get(handlers::download_all))
        .route("/api/file/:pin/:filename", get(handlers::download_file))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
