// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP routes.

pub mod analytics;
pub mod files;
pub mod health;
pub mod process;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::AppServices;

/// Build the full application router over `services`.
pub fn router(services: AppServices) -> Router {
    let body_limit = services.config().max_upload_bytes;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/process", post(process::process))
        .route("/api/files", get(files::list_files).post(files::upload_file))
        .route("/api/files/:id", get(files::download_file))
        .route(
            "/api/analytics",
            get(analytics::list_events).post(analytics::record_event),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(services)
}
