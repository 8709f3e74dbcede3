// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::Serialize;

use crate::error::ApiResult;
use crate::services::{AnalyticsEvent, AppServices};

#[derive(Debug, Serialize)]
pub struct EventList {
    pub events: Vec<AnalyticsEvent>,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
}

/// GET /api/analytics
pub async fn list_events(State(services): State<AppServices>) -> ApiResult<Json<EventList>> {
    let events = services.analytics().events().await?;
    Ok(Json(EventList { events }))
}

/// POST /api/analytics
pub async fn record_event(
    State(services): State<AppServices>,
    payload: Result<Json<AnalyticsEvent>, JsonRejection>,
) -> ApiResult<Json<Ack>> {
    let Json(event) = payload?;
    services.analytics().record_event(event).await?;
    Ok(Json(Ack { success: true }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;

    use crate::fixtures::{body_json, post_json, send_to, test_app};

    #[tokio::test]
    async fn posted_events_are_listed() {
        let app = test_app();
        let (status, _, body) = send_to(
            &app,
            post_json(
                "/api/analytics",
                json!({ "event": "download", "properties": { "file": "a.pdf" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json(body)["success"], true);

        let (status, _, body) = send_to(
            &app,
            Request::builder()
                .uri("/api/analytics")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let listed = body_json(body);
        assert_eq!(listed["events"][0]["event"], "download");
        assert_eq!(listed["events"][0]["properties"]["file"], "a.pdf");
    }

    #[tokio::test]
    async fn malformed_event_is_bad_request() {
        let (status, _, body) =
            send_to(&test_app(), post_json("/api/analytics", json!({ "name": 1 }))).await;
        assert!(status.is_client_error());
        assert_eq!(body_json(body)["success"], false);
    }
}
