// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// POST /api/process
//
// `multipart/form-data` requests stream one SSE frame per progress event.
// `application/json` requests wait for the job and answer with one body.

use axum::Json;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use stapel_core::{FileReport, InputFile, JobId, JobRequest, MergedDocument, ProgressEvent, StapelError};
use stapel_pipeline::{JobOutcome, JobSummary};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::services::AppServices;

/// Aggregated result of a non-streaming job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    /// The job ran to the end. Per-file outcomes are in `results`.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub processed_count: usize,
    pub failed_count: usize,
    pub results: Vec<FileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<MergedDocument>,
    pub processed_at: DateTime<Utc>,
}

impl From<JobSummary> for ProcessResponse {
    fn from(summary: JobSummary) -> Self {
        Self {
            success: summary.outcome == JobOutcome::Completed,
            job_id: summary.job_id,
            processed_count: summary.processed_count,
            failed_count: summary.failed_count,
            results: summary.results,
            merged: summary.merged,
            processed_at: Utc::now(),
        }
    }
}

pub async fn process(State(services): State<AppServices>, request: Request) -> ApiResult<Response> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &services).await?;
        let job = read_job_form(multipart).await?;
        info!(operation = %job.operation, files = job.files.len(), "Streaming job");
        Ok(stream_job(&services, job).into_response())
    } else if content_type.starts_with("application/json") {
        let Json(job) = Json::<JobRequest>::from_request(request, &services).await?;
        info!(operation = %job.operation, files = job.files.len(), "Running job");
        Ok(run_job(&services, job).await?.into_response())
    } else {
        Err(ApiError::UnsupportedMediaType(if content_type.is_empty() {
            "missing Content-Type".to_string()
        } else {
            content_type
        }))
    }
}

fn stream_job(services: &AppServices, job: JobRequest) -> impl IntoResponse {
    sse_response(services.spawn_job(job), services.config().sse_keep_alive())
}

/// Frame each event as one `data:` payload. Idle streams get a comment
/// every `keep_alive`.
fn sse_response<S>(events: S, keep_alive: Duration) -> Sse<impl Stream<Item = Result<Event, StapelError>>>
where
    S: Stream<Item = ProgressEvent> + Send + 'static,
{
    let frames = events.map(|event| {
        if event.is_terminal() {
            debug!(kind = event.kind(), "Stream ending");
        } else {
            debug!(kind = event.kind(), file = ?event.file_name(), "Event");
        }
        event.to_json().map(|payload| Event::default().data(payload))
    });
    Sse::new(frames).keep_alive(KeepAlive::new().interval(keep_alive))
}

async fn run_job(services: &AppServices, job: JobRequest) -> ApiResult<Json<ProcessResponse>> {
    let summary = services.run_job(job).await;
    if summary.outcome == JobOutcome::Rejected {
        let reason = summary.error.unwrap_or_else(|| "job rejected".to_string());
        return Err(ApiError::BadRequest(reason));
    }
    Ok(Json(summary.into()))
}

/// Collect the `operation`, `options`, and `files` fields of a form.
async fn read_job_form(mut multipart: Multipart) -> ApiResult<JobRequest> {
    let mut operation = String::new();
    let mut options = Value::Null;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "operation" => operation = field.text().await?.trim().to_string(),
            "options" => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    options = serde_json::from_str(&text).map_err(|err| {
                        ApiError::BadRequest(format!("options is not valid JSON: {err}"))
                    })?;
                }
            }
            "files" | "files[]" | "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("file-{}", files.len() + 1));
                let data = field.bytes().await?;
                debug!(file = %file_name, size = data.len(), "Received file");
                files.push(InputFile::new(file_name, data));
            }
            other => debug!(field = other, "Ignoring form field"),
        }
    }

    Ok(JobRequest::new(operation, files).with_options(options))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use base64::Engine;
    use futures::StreamExt;
    use serde_json::{Value, json};
    use stapel_core::{Operation, ProgressEvent};

    use super::sse_response;

    use crate::fixtures::{FormPart, body_json, body_text, multipart_request, post_json, sample_pdf, send};

    fn sse_events(body: &str) -> Vec<Value> {
        body.lines()
            .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
            .map(|data| serde_json::from_str(data.trim()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn multipart_job_streams_ordered_events() {
        let pdf = sample_pdf(2);
        let request = multipart_request(
            "/api/process",
            &[
                FormPart::text("operation", "rotate"),
                FormPart::text("options", r#"{"degrees": 90}"#),
                FormPart::file("files", "a.pdf", &pdf),
                FormPart::file("files", "b.pdf", &pdf),
            ],
        );
        let (status, headers, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(
            headers["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let events = sse_events(&body_text(body));
        let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(kinds.first(), Some(&"start"));
        assert_eq!(kinds.last(), Some(&"complete"));
        assert_eq!(kinds.iter().filter(|k| **k == "file_complete").count(), 2);

        let first_b = events
            .iter()
            .position(|e| e["fileName"] == "b.pdf")
            .unwrap();
        assert!(events[..first_b].iter().any(|e| e["type"] == "file_complete" && e["fileName"] == "a.pdf"));

        let complete = events.last().unwrap();
        assert_eq!(complete["processedCount"], 2);
        assert_eq!(complete["failedCount"], 0);
    }

    #[tokio::test]
    async fn multipart_validation_failure_is_a_single_error_event() {
        let request = multipart_request("/api/process", &[FormPart::text("operation", "compress")]);
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);

        let events = sse_events(&body_text(body));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "error");
        assert_eq!(events[0]["error"], "invalid job: no files provided");
    }

    #[tokio::test]
    async fn json_job_returns_aggregate_results() {
        let pdf = base64::engine::general_purpose::STANDARD.encode(sample_pdf(3));
        let request = post_json(
            "/api/process",
            json!({
                "operation": "split",
                "files": [{ "name": "doc.pdf", "data": pdf }],
            }),
        );
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);

        let body = body_json(body);
        assert_eq!(body["success"], true);
        assert!(body["processedAt"].is_string());
        assert_eq!(body["results"][0]["fileName"], "doc.pdf");
        assert_eq!(body["results"][0]["success"], true);
    }

    #[tokio::test]
    async fn json_merge_includes_merged_document() {
        let pdf = base64::engine::general_purpose::STANDARD.encode(sample_pdf(2));
        let request = post_json(
            "/api/process",
            json!({
                "operation": "merge",
                "files": [
                    { "name": "a.pdf", "data": pdf },
                    { "name": "b.pdf", "data": pdf },
                ],
            }),
        );
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);

        let body = body_json(body);
        assert_eq!(body["merged"]["pageCount"], 4);
        assert_eq!(body["merged"]["sourceFiles"], json!(["a.pdf", "b.pdf"]));
    }

    #[tokio::test]
    async fn json_unknown_operation_is_bad_request() {
        let request = post_json(
            "/api/process",
            json!({ "operation": "bogus", "files": [{ "name": "a.pdf", "data": "YWJj" }] }),
        );
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = body_json(body);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("bogus"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_sends_keep_alive_comments() {
        let events = futures::stream::iter([ProgressEvent::Start {
            total_files: 1,
            operation: Operation::Ocr,
        }])
        .chain(futures::stream::once(async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            ProgressEvent::Error {
                error: "engine went away".into(),
            }
        }));

        let response = sse_response(events, Duration::from_secs(1)).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = body_text(body);

        assert!(text.lines().any(|line| line.starts_with(':')), "{text}");
        let kinds: Vec<Value> = sse_events(&text).into_iter().map(|e| e["type"].clone()).collect();
        assert_eq!(kinds, vec![json!("start"), json!("error")]);
    }

    #[tokio::test]
    async fn unknown_content_type_is_rejected() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/process")
            .header("content-type", "text/plain")
            .body(axum::body::Body::from("hello"))
            .unwrap();
        let (status, _, _) = send(request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
