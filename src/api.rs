#![forbid(unsafe_code)]

//! HTTP surface: one endpoint to fetch a video, one to stream it back.
//!
//! The streaming endpoint only looks at the storage directory. Whether the
//! registry still knows about a file has no influence on serving it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mime_guess::{MimeGuess, mime};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::fetcher::is_single_segment;
use crate::resolver::ResolveError;
use crate::service::{ServiceError, VideoService};

const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    service: Arc<VideoService>,
    storage_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(service: Arc<VideoService>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            storage_dir: Arc::new(storage_dir.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub url: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Details go to the log, never to the client.
    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal Server Error".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Resolve(ResolveError::NotFound) => {
                Self::not_found(ResolveError::NotFound.to_string())
            }
            ServiceError::Resolve(ResolveError::Search(source))
            | ServiceError::Download(source) => {
                error!(error = %format_args!("{source:#}"), "download request failed");
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "detail": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/download/", post(download_video))
        .route("/download", post(download_video))
        .route("/videos/{filename}", get(serve_video))
        .fallback(fallback)
        .with_state(state)
}

async fn fallback() -> ApiError {
    ApiError::not_found("Not Found")
}

async fn download_video(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> ApiResult<Json<DownloadResponse>> {
    info!(query = %payload.query, "download requested");
    let service = state.service.clone();
    let query = payload.query;
    // Resolve and fetch shell out to yt-dlp and block until it exits.
    let outcome = tokio::task::spawn_blocking(move || service.download(&query))
        .await
        .map_err(|err| {
            error!(error = %err, "download task panicked");
            ApiError::internal()
        })??;
    Ok(Json(DownloadResponse { url: outcome.url }))
}

async fn serve_video(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    ensure_safe_path_segment(&filename)?;
    let path = state.storage_dir.join(&filename);
    stream_file(path, Some(&headers)).await
}

/// Validates that a single dynamic path segment never escapes its base folder.
fn ensure_safe_path_segment(value: &str) -> ApiResult<()> {
    if !is_single_segment(value) {
        return Err(ApiError::not_found("File not found"));
    }
    Ok(())
}

/// Stored files are always served as some `video/*` type, defaulting to mp4.
fn video_mime_for(path: &Path) -> HeaderValue {
    MimeGuess::from_path(path)
        .first()
        .filter(|guess| guess.type_() == mime::VIDEO)
        .and_then(|guess| HeaderValue::from_str(guess.as_ref()).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_VIDEO_MIME))
}

async fn stream_file(path: PathBuf, headers: Option<&HeaderMap>) -> ApiResult<Response> {
    let mut file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;
    if !metadata.is_file() {
        return Err(ApiError::not_found("File not found"));
    }
    let size = metadata.len();

    let range = headers
        .and_then(|headers| headers.get(header::RANGE))
        .and_then(|value| parse_range_header(value, size));

    let mut response = if let Some((start, end)) = range {
        if start >= size {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            response
                .headers_mut()
                .insert(header::CONTENT_RANGE, header_value(format!("bytes */{size}"))?);
            response
        } else {
            let end = end.min(size.saturating_sub(1));
            let length = end - start + 1;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|err| {
                    warn!(file = %path.display(), error = %err, "seek failed");
                    ApiError::internal()
                })?;
            let body = Body::from_stream(ReaderStream::new(file.take(length)));
            let mut response = body.into_response();
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            response.headers_mut().insert(
                header::CONTENT_RANGE,
                header_value(format!("bytes {start}-{end}/{size}"))?,
            );
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            response
        }
    } else {
        let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        response
    };

    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, video_mime_for(&path));

    Ok(response)
}

fn header_value(value: String) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|_| ApiError::internal())
}

/// Parses a single `bytes=` range. Multi-range and malformed headers are
/// ignored so the whole file is served instead.
fn parse_range_header(value: &HeaderValue, size: u64) -> Option<(u64, u64)> {
    let value = value.to_str().ok()?.trim();
    let range = value.strip_prefix("bytes=")?.trim();
    if range.is_empty() || range.contains(',') {
        return None;
    }
    let (start_str, end_str) = range.split_once('-')?;

    if start_str.is_empty() {
        // Suffix range: "-N" means last N bytes.
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 || size == 0 {
            return None;
        }
        if suffix_len >= size {
            return Some((0, size - 1));
        }
        return Some((size - suffix_len, size - 1));
    }

    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        size.saturating_sub(1)
    } else {
        end_str.parse().ok()?
    };
    if end < start {
        return None;
    }
    Some((start, end))
}
