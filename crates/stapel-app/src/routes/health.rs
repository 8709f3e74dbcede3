// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::services::AppServices;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ocr_available: bool,
    pub active_operations: usize,
    pub pending_operations: usize,
}

/// GET /health
pub async fn health_check(State(services): State<AppServices>) -> Json<HealthResponse> {
    let pipeline = services.orchestrator().pipeline();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        ocr_available: pipeline.has_ocr(),
        active_operations: pipeline.queue().active(),
        pending_operations: pipeline.queue().pending(),
    })
}
