use std::time::Instant;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::core::error::ProxyError;
use crate::core::types::{BlobLocation, VideoId};
use crate::observability::metrics as obs;
use crate::resolve::{
    generate_candidates, thumbnail_blob_path, ContainerProber, ProbeReport, Resolution,
};
use crate::storage::{content_type_for_path, encode_blob_path, BlobResponse, BlobStore, ByteRange};

use super::router::AppState;

/// Debug header naming the container a video was served from.
pub const X_SOURCE_CONTAINER: &str = "x-source-container";
/// Debug header naming the (encoded) blob path a video was served from.
pub const X_SOURCE_PATH: &str = "x-source-path";

const DEFAULT_VIDEO_CONTENT_TYPE: &str = "video/mp4";

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    status: u16,
}

fn error_json(status: StatusCode, error: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        status: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

fn proxy_error_response(e: &ProxyError) -> Response {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_json(status, e.error_code(), &e.to_string())
}

/// 404 body after every candidate was probed.
#[derive(Debug, Serialize)]
struct VideoNotFoundResponse<'a> {
    error: &'static str,
    #[serde(flatten)]
    report: &'a ProbeReport,
    message: &'static str,
}

fn finish(endpoint: &'static str, started: Instant, response: Response) -> Response {
    obs::inc_proxy_request(endpoint, obs::outcome_for_status(response.status().as_u16()));
    obs::record_request_duration(endpoint, started.elapsed().as_secs_f64());
    response
}

// ---------------------------------------------------------------------------
// Video proxy
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct VideoProxyParams {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

/// `GET /api/video-proxy?videoId=...`
///
/// Guesses where the video lives, probes containers × paths in order and
/// streams the first hit. A `Range` request header is forwarded upstream.
pub async fn video_proxy<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    Query(params): Query<VideoProxyParams>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let response = serve_video(&state, params, &headers).await;
    finish("video", started, response)
}

async fn serve_video<S: BlobStore>(
    state: &AppState<S>,
    params: VideoProxyParams,
    headers: &HeaderMap,
) -> Response {
    let Some(video_id) = params.video_id.as_deref().and_then(VideoId::parse) else {
        return proxy_error_response(&ProxyError::MissingParameter { param: "videoId" });
    };

    let storage = &state.config.storage;
    if let Some(reason) = storage.missing_credentials() {
        error!(reason, "refusing video request, storage credentials missing");
        return proxy_error_response(&ProxyError::Misconfigured {
            reason: reason.to_string(),
        });
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(ByteRange::parse);

    info!(%video_id, range = ?range, "video request");

    let candidates = generate_candidates(&video_id);
    let prober = ContainerProber::new(
        state.store.as_ref(),
        &storage.containers,
        storage.fallback_max_day,
    );

    match prober.resolve(&video_id, &candidates, range).await {
        Resolution::Found(resolved) => {
            let mut response =
                stream_response("video", resolved.response, DEFAULT_VIDEO_CONTENT_TYPE);
            if state.config.delivery.debug_headers {
                insert_debug_headers(response.headers_mut(), &resolved.location);
            }
            response
        }
        Resolution::RangeNotSatisfiable(rejected) => {
            let mut response = error_json(
                StatusCode::RANGE_NOT_SATISFIABLE,
                "range_not_satisfiable",
                "The requested range lies outside the video.",
            );
            let headers = response.headers_mut();
            if let Some(total) = rejected.total_length {
                if let Ok(v) = HeaderValue::from_str(&format!("bytes */{}", total)) {
                    headers.insert(header::CONTENT_RANGE, v);
                }
            }
            if state.config.delivery.debug_headers {
                insert_debug_headers(headers, &rejected.location);
            }
            response
        }
        Resolution::Exhausted(report) => {
            let body = VideoNotFoundResponse {
                error: "Video not found",
                report: &report,
                message: "Video not found in any container or path variation",
            };
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}

fn insert_debug_headers(headers: &mut HeaderMap, location: &BlobLocation) {
    let pairs = [
        (X_SOURCE_CONTAINER, location.container.clone()),
        (X_SOURCE_PATH, encode_blob_path(&location.path)),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

/// Relay an upstream blob as a streaming response.
///
/// `200`, or `206` with `Content-Range` when upstream honoured a range.
fn stream_response(
    endpoint: &'static str,
    blob: BlobResponse,
    default_content_type: &str,
) -> Response {
    let status = if blob.content_range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let body = blob.body.map(move |chunk| {
        match &chunk {
            Ok(bytes) => obs::add_bytes_streamed(endpoint, bytes.len() as u64),
            Err(e) => warn!(error = %e, "upstream body failed mid-stream"),
        }
        chunk
    });

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;

    let meta = blob.meta;
    let content_type = meta
        .content_type
        .unwrap_or_else(|| default_content_type.to_string());
    let headers = response.headers_mut();
    let mut set = |name: HeaderName, value: &str| {
        if let Ok(v) = HeaderValue::from_str(value) {
            headers.insert(name, v);
        }
    };

    set(header::CONTENT_TYPE, &content_type);
    set(
        header::ACCEPT_RANGES,
        meta.accept_ranges.as_deref().unwrap_or("bytes"),
    );
    if let Some(len) = meta.content_length {
        set(header::CONTENT_LENGTH, &len.to_string());
    }
    if let Some(range) = &blob.content_range {
        set(header::CONTENT_RANGE, range);
    }
    if let Some(etag) = &meta.etag {
        set(header::ETAG, etag);
    }
    if let Some(modified) = meta.last_modified {
        set(
            header::LAST_MODIFIED,
            &modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
    }

    response
}

// ---------------------------------------------------------------------------
// Image proxy
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ImageProxyParams {
    path: Option<String>,
}

/// `GET /api/image-proxy?path=...`
///
/// Serves a thumbnail from the thumbnail container. The reference may be a
/// full (even signed) blob URL; it is always re-signed with the configured SAS.
pub async fn image_proxy<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
    Query(params): Query<ImageProxyParams>,
) -> Response {
    let started = Instant::now();
    let response = serve_image(&state, params).await;
    finish("image", started, response)
}

async fn serve_image<S: BlobStore>(state: &AppState<S>, params: ImageProxyParams) -> Response {
    let Some(path) = params.path.as_deref().and_then(thumbnail_blob_path) else {
        return proxy_error_response(&ProxyError::MissingParameter { param: "path" });
    };

    let storage = &state.config.storage;
    if let Some(reason) = storage.missing_credentials() {
        error!(reason, "refusing image request, storage credentials missing");
        return proxy_error_response(&ProxyError::Misconfigured {
            reason: reason.to_string(),
        });
    }

    let location = BlobLocation::new(storage.thumbnail_container.as_str(), path);
    match state.store.get_blob(&location, None).await {
        Ok(blob) => {
            let mut response =
                stream_response("image", blob, content_type_for_path(&location.path));
            if let Ok(v) = HeaderValue::from_str(&state.config.delivery.image_cache_control) {
                response.headers_mut().insert(header::CACHE_CONTROL, v);
            }
            response
        }
        Err(e) => {
            if e.is_not_found() {
                info!(%location, "thumbnail not found");
            } else {
                error!(%location, error = %e, "storage error serving thumbnail");
            }
            proxy_error_response(&ProxyError::from(e))
        }
    }
}

// ---------------------------------------------------------------------------
// Health endpoints
// ---------------------------------------------------------------------------

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics_handler<S: BlobStore + 'static>(State(state): State<AppState<S>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        )
            .into_response(),
        None => error_json(
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics_unavailable",
            "No metrics recorder is installed.",
        ),
    }
}

/// `GET /healthz`: liveness probe.
pub async fn healthz<S: BlobStore + 'static>(
    State(state): State<AppState<S>>,
) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /readyz`: readiness probe.
///
/// Ready when storage credentials are present and at least one video
/// container is configured. Upstream is not contacted.
pub async fn readyz<S: BlobStore + 'static>(State(state): State<AppState<S>>) -> Response {
    let storage = &state.config.storage;
    let mut checks = serde_json::Map::new();
    let mut all_ok = true;

    match storage.missing_credentials() {
        None => {
            checks.insert("credentials".to_string(), serde_json::json!({"status": "ok"}));
        }
        Some(reason) => {
            all_ok = false;
            checks.insert(
                "credentials".to_string(),
                serde_json::json!({"status": "error", "error": reason}),
            );
        }
    }

    if storage.containers.is_empty() {
        all_ok = false;
        checks.insert(
            "containers".to_string(),
            serde_json::json!({"status": "error", "error": "no video containers configured"}),
        );
    } else {
        checks.insert(
            "containers".to_string(),
            serde_json::json!({"status": "ok", "count": storage.containers.len()}),
        );
    }

    let (status, http_status) = if all_ok {
        ("ready", StatusCode::OK)
    } else {
        ("not_ready", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        http_status,
        Json(serde_json::json!({
            "status": status,
            "checks": checks,
        })),
    )
        .into_response()
}
