use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use http::{header, HeaderName, HeaderValue, Method};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::core::config::{AppConfig, DeliveryConfig};
use crate::storage::BlobStore;

use super::handlers;
use super::middleware::{RequestIdLayer, X_REQUEST_ID};

// ---------------------------------------------------------------------------
// Proxy router
// ---------------------------------------------------------------------------

/// Application state shared across all handlers.
///
/// Generic over the blob backend: `AzureBlobStore` in production,
/// `InMemoryBlobStore` in tests.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub config: Arc<AppConfig>,
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`. `None` when no recorder was installed.
    pub metrics_handle: Option<PrometheusHandle>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        }
    }
}

impl<S> AppState<S> {
    pub fn new(store: Arc<S>, config: AppConfig, metrics_handle: Option<PrometheusHandle>) -> Self {
        Self {
            store,
            config: Arc::new(config),
            start_time: Instant::now(),
            metrics_handle,
        }
    }
}

/// Build the Axum router with all routes.
///
/// - `GET /api/video-proxy?videoId=...`
/// - `GET /api/image-proxy?path=...`
/// - `GET /healthz`, `GET /readyz`, `GET /metrics`
pub fn build_router<S: BlobStore + 'static>(state: AppState<S>) -> Router {
    let delivery = &state.config.delivery;
    tracing::info!(
        debug_headers = delivery.debug_headers,
        image_cache_control = %delivery.image_cache_control,
        cors_origins = ?delivery.cors_allowed_origins,
        "delivery configuration loaded"
    );
    let cors = cors_layer(delivery);

    Router::new()
        .route("/api/video-proxy", get(handlers::video_proxy::<S>))
        .route("/api/image-proxy", get(handlers::image_proxy::<S>))
        .route("/healthz", get(handlers::healthz::<S>))
        .route("/readyz", get(handlers::readyz::<S>))
        .route("/metrics", get(handlers::metrics_handler::<S>))
        .layer(cors)
        .layer(RequestIdLayer)
        .with_state(state)
}

/// Browsers play proxied video directly, so Range must be allowed in and the
/// range headers exposed back out.
fn cors_layer(delivery: &DeliveryConfig) -> CorsLayer {
    let origins = &delivery.cors_allowed_origins;
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::RANGE])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            X_REQUEST_ID.clone(),
            HeaderName::from_static(handlers::X_SOURCE_CONTAINER),
            HeaderName::from_static(handlers::X_SOURCE_PATH),
        ])
        .max_age(Duration::from_secs(86400))
}
