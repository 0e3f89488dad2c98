use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use fitsaga_proxy::core::config::AppConfig;
use fitsaga_proxy::core::redact::Redacted;
use fitsaga_proxy::core::shutdown::{ShutdownCoordinator, SHUTDOWN_TIMEOUT_SECS};
use fitsaga_proxy::delivery::router::{self, AppState};
use fitsaga_proxy::observability::metrics as obs_metrics;
use fitsaga_proxy::storage::azure::AzureBlobStore;

#[tokio::main]
async fn main() -> ExitCode {
    // Must be installed before any metrics are recorded.
    let metrics_handle = obs_metrics::install_prometheus_recorder();

    // Log panics with a backtrace and count them.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        obs_metrics::inc_panic_total();
        let backtrace = std::backtrace::Backtrace::force_capture();
        eprintln!("PANIC: {info}\nBacktrace:\n{backtrace}");
        default_hook(info);
    }));

    // Layered: default.toml → {env}.toml → env vars
    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = %AppConfig::env_name(),
        "fitsaga-proxy starting"
    );

    let metrics_handle = match metrics_handle {
        Ok(handle) => {
            obs_metrics::describe_all_metrics();
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "failed to install Prometheus recorder, /metrics disabled");
            None
        }
    };

    info!(
        account = %config.storage.account_name,
        sas_token = %Redacted::new(&config.storage.sas_token),
        endpoint = %config.storage.base_url(),
        containers = ?config.storage.containers,
        thumbnail_container = %config.storage.thumbnail_container,
        fallback_max_day = config.storage.fallback_max_day,
        request_timeout_secs = config.storage.request_timeout_secs,
        "storage configuration loaded"
    );
    if let Some(reason) = config.storage.missing_credentials() {
        // Still serve health endpoints; proxy requests answer 500 until fixed.
        warn!(reason, "storage credentials incomplete");
    }

    let store = match AzureBlobStore::new(&config.storage) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to initialise blob store");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = ShutdownCoordinator::new();
    let app_state = AppState::new(store, config.clone(), metrics_handle);
    let start_time = app_state.start_time;
    let app = router::build_router(app_state);

    let uptime_cancel = shutdown.token();
    tokio::spawn(async move {
        obs_metrics::run_uptime_task(start_time, uptime_cancel).await;
    });

    let http_addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port)
        .parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            error!(
                host = %config.server.host,
                port = config.server.port,
                error = %e,
                "invalid HTTP bind address"
            );
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%http_addr, error = %e, "failed to bind HTTP listener");
            return ExitCode::FAILURE;
        }
    };

    info!(%http_addr, "HTTP server listening");

    let shutdown_token = shutdown.token();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown.wait_for_signal_and_shutdown() => {}
        result = &mut server => {
            // Server stopped without a signal.
            match result {
                Ok(Ok(())) => warn!("HTTP server exited unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "HTTP server error"),
                Err(e) => error!(error = %e, "HTTP server task failed"),
            }
            shutdown.trigger_shutdown();
            return ExitCode::FAILURE;
        }
    }

    // Drain in-flight streams, bounded.
    obs_metrics::set_shutdown_in_progress(true);
    info!(
        timeout_secs = SHUTDOWN_TIMEOUT_SECS,
        "draining in-flight requests"
    );

    match tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), server).await {
        Ok(Ok(Ok(()))) => {
            info!("graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "HTTP server error during shutdown");
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server task failed during shutdown");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!(
                "shutdown timed out after {}s, forcing exit",
                SHUTDOWN_TIMEOUT_SECS
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
