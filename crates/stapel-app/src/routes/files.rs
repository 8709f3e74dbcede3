// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File upload, listing, and download.

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::services::{AppServices, StoredFile};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Name prefix to filter on.
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileList {
    pub files: Vec<StoredFile>,
    pub count: usize,
}

/// POST /api/files. Exactly one file field per request.
pub async fn upload_file(
    State(services): State<AppServices>,
    mut multipart: Multipart,
) -> ApiResult<Json<StoredFile>> {
    let mut stored = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if stored.is_some() {
            return Err(ApiError::BadRequest("one file per upload".into()));
        }
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;
        let file = services.store().upload(&file_name, data, content_type).await?;
        info!(id = %file.id, name = %file.name, size = file.size, "File uploaded");
        stored = Some(file);
    }

    stored
        .map(Json)
        .ok_or_else(|| ApiError::BadRequest("no file provided".into()))
}

/// GET /api/files?path=prefix
pub async fn list_files(
    State(services): State<AppServices>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<FileList>> {
    let files = services.store().list(query.path.as_deref()).await?;
    Ok(Json(FileList {
        count: files.len(),
        files,
    }))
}

/// GET /api/files/:id
pub async fn download_file(
    State(services): State<AppServices>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let (meta, data) = services
        .store()
        .fetch(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {id}")))?;

    let content_type = meta
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!("inline; filename=\"{}\"", meta.name.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    use stapel_core::AppConfig;

    use crate::fixtures::{FormPart, body_json, multipart_request, send_to, test_app, test_app_with};

    #[tokio::test]
    async fn upload_then_list_and_download() {
        let app = test_app();
        let request = multipart_request(
            "/api/files",
            &[FormPart::file("file", "scans/page1.png", b"png bytes")],
        );
        let (status, _, body) = send_to(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let stored = body_json(body);
        assert_eq!(stored["name"], "scans/page1.png");
        assert_eq!(stored["size"], 9);
        let id = stored["id"].as_str().unwrap().to_string();
        assert_eq!(stored["url"], format!("/api/files/{id}"));

        let list = Request::builder()
            .uri("/api/files?path=scans/")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send_to(&app, list).await;
        assert_eq!(status, StatusCode::OK);
        let listed = body_json(body);
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["files"][0]["id"], id.as_str());

        let (status, headers, body) = send_to(
            &app,
            Request::builder()
                .uri(format!("/api/files/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/octet-stream");
        assert_eq!(&body[..], b"png bytes");
    }

    #[tokio::test]
    async fn upload_without_file_is_bad_request() {
        let request = multipart_request("/api/files", &[FormPart::text("note", "hi")]);
        let (status, _, body) = send_to(&test_app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body_json(body)["error"], "no file provided");
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let request = Request::builder()
            .uri("/api/files/deadbeef")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send_to(&test_app(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_over_store_capacity_is_insufficient_storage() {
        let app = test_app_with(AppConfig {
            max_stored_bytes: 4,
            ..AppConfig::default()
        });
        let request = multipart_request("/api/files", &[FormPart::file("file", "big.pdf", b"%PDF-1.5")]);
        let (status, _, body) = send_to(&app, request).await;
        assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE);
        assert_eq!(body_json(body)["success"], false);
    }
}
