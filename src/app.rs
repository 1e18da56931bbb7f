use crate::config::{self, MAX_BODY_BYTES, UpstreamConfig};
use crate::error::{AppError, AppResult};
use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::{Arc, Once, OnceLock};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub http: reqwest::Client,
    pub metrics: PrometheusHandle,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<AppError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    /// Prometheus scrape route; unmounted unless configured.
    pub metrics_path: Option<String>,
    pub static_dir: Option<PathBuf>,
    pub upstream: UpstreamConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = config::non_empty(&lookup, "PORT")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| config::DEFAULT_PORT.to_string());
        let metrics_path = config::non_empty(&lookup, "METRICS_PATH")
            .map(|v| format!("/{}", v.trim().trim_start_matches('/')));
        Self {
            listen: format!("0.0.0.0:{port}"),
            metrics_path,
            static_dir: config::static_dir_from_lookup(&lookup),
            upstream: UpstreamConfig::from_lookup(&lookup),
        }
    }
}

pub fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env())
}

pub fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("chatrelay/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| {
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "http_client_init_failed",
                err.to_string(),
            )
        })?;

    let metrics = init_metrics()?;

    if runtime.upstream.api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; /api/chat will fail until it is");
    }
    match &runtime.static_dir {
        Some(dir) => tracing::info!(static_dir = %dir.display(), "static file serving enabled"),
        None => tracing::debug!("static file serving disabled"),
    }

    Ok(AppState {
        runtime: Arc::new(runtime),
        http,
        metrics,
    })
}

fn init_metrics() -> AppResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR.set(AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "metrics_init_failed",
                    err.to_string(),
                ));
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE.get().cloned().ok_or_else(|| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics_init_failed",
            "metrics recorder not available",
        )
    })
}

pub fn build_app(state: AppState) -> Router {
    let mut router = Router::<AppState>::new()
        .route(
            "/health",
            get(crate::handlers::health).fallback(crate::handlers::not_found),
        )
        .route(
            "/api/chat",
            post(crate::handlers::chat)
                .fallback(crate::handlers::not_found)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        );
    if let Some(metrics_path) = state.runtime.metrics_path.as_deref() {
        router = router.route(
            metrics_path,
            get(crate::handlers::metrics).fallback(crate::handlers::not_found),
        );
    }
    router
        .fallback(crate::frontend::frontend_fallback)
        .with_state(state)
        .layer(middleware::from_fn(preflight))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS, GET"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        // Wraps propagation so the id is set before it is read.
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
}

// Any OPTIONS request is a CORS preflight, whatever the path.
async fn preflight(req: Request<Body>, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    next.run(req).await
}
