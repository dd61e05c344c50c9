// HTTP API server
//
// Thin axum adapter over the gateway:
// - /healthz, /tools, /tools/{name}: public
// - /exec, /jobs, /jobs/{id}, /stats: API key required
// - /metrics: Prometheus scrape endpoint

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::JsonRejection, ConnectInfo, DefaultBodyLimit, FromRequestParts, Path, Query,
        Request, State,
    },
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::{Caller, Dispatch, Gateway};
use crate::jobs::JobStatus;
use crate::metrics;
use crate::tools::ExecRequest;

/// Service name reported by the health check
pub const SERVICE_NAME: &str = "netkit-api";

const DEFAULT_JOB_LIST_LIMIT: usize = 100;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub auth: Authenticator,
    pub max_request_bytes: usize,
}

impl AppState {
    pub fn new(gateway: Gateway, auth: Authenticator) -> Self {
        Self {
            gateway,
            auth,
            max_request_bytes: Config::default().server.max_request_bytes,
        }
    }

    pub fn with_max_request_bytes(mut self, bytes: usize) -> Self {
        self.max_request_bytes = bytes;
        self
    }
}

/// Error response: `{"error": "..."}` with the matching status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    fn too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "Request too large")
    }
}

/// HTTP status for each error kind
pub fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        GatewayError::Permission(_) => StatusCode::FORBIDDEN,
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        if let GatewayError::Internal(ref detail) = err {
            error!("internal error: {}", detail);
        }
        let retry_after_secs = match err {
            GatewayError::RateLimited {
                retry_after_secs, ..
            } => retry_after_secs,
            _ => None,
        };
        Self {
            status: status_for(&err),
            message: err.public_message(),
            retry_after_secs,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::too_large();
        }
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "error": self.message }))).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Caller identity derived from the connection and credential headers
///
/// Never rejects; handlers decide whether authentication is required.
pub struct RequestCaller(pub Caller);

impl FromRequestParts<AppState> for RequestCaller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let header_value = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
        };
        let outcome = state.auth.authenticate(
            header_value("x-api-key"),
            header_value(header::AUTHORIZATION.as_str()),
        );

        Ok(Self(Caller::new(ip, outcome.authenticated, outcome.principal)))
    }
}

fn require_auth(caller: &Caller) -> ApiResult<()> {
    if caller.authenticated {
        Ok(())
    } else {
        warn!(client_ip = %caller.ip, "unauthenticated request");
        Err(GatewayError::Unauthorized("Unauthorized".to_string()).into())
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/tools", get(tools_handler))
        .route("/tools/{name}", get(tool_handler))
        .route("/exec", post(exec_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/{id}", get(get_job_handler).delete(delete_job_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_XSS_PROTECTION,
                    HeaderValue::from_static("1; mode=block"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::STRICT_TRANSPORT_SECURITY,
                    HeaderValue::from_static("max-age=31536000; includeSubDomains"),
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    content_length_guard,
                ))
                .layer(DefaultBodyLimit::max(max_request_bytes)),
        )
        .with_state(state)
}

/// Reject oversized bodies up front when the client declares a length
async fn content_length_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    match declared {
        Some(length) if length > state.max_request_bytes => ApiError::too_large().into_response(),
        _ => next.run(request).await,
    }
}

/// Start the HTTP API and block until shutdown
pub async fn serve(config: Config) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;

    let gateway = Gateway::from_config(&config)?;
    let auth = if config.auth.enabled {
        Authenticator::new(config.auth.api_keys.clone())
    } else {
        warn!("Authentication disabled; every caller is trusted");
        Authenticator::open()
    };

    let sweeper = gateway.jobs().spawn_cleanup_task();
    let state = AppState::new(gateway.clone(), auth)
        .with_max_request_bytes(config.server.max_request_bytes);
    let app = router(state);

    let addr = config.server.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        "Starting {} v{} on {} ({} tools registered)",
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        addr,
        gateway.registry().len()
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    gateway.jobs().shutdown();
    if let Err(e) = sweeper.await {
        warn!("job sweep task ended abnormally: {}", e);
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check endpoint
async fn healthz_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "service": SERVICE_NAME,
        "capabilities": state.gateway.capabilities().await,
    }))
}

async fn tools_handler(State(state): State<AppState>) -> Json<Value> {
    let availability = state.gateway.tool_availability().await;
    let tools: BTreeMap<String, Value> = state
        .gateway
        .registry()
        .descriptors()
        .into_iter()
        .map(|d| {
            let entry = json!({
                "name": d.name,
                "description": d.description,
                "available": availability.get(&d.name).copied().unwrap_or(false),
                "requires_capability": d.requires_capability,
            });
            (d.name, entry)
        })
        .collect();

    Json(json!({ "tools": tools }))
}

async fn tool_handler(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let tool = state
        .gateway
        .registry()
        .get(&name)
        .ok_or_else(|| GatewayError::not_found(format!("Unknown tool: {}", name)))?;
    let d = tool.descriptor();

    Ok(Json(json!({
        "name": d.name,
        "description": d.description,
        "binary": d.binary,
        "available": state.gateway.tool_available(&d.name).await,
        "requires_capability": d.requires_capability,
        "min_timeout": d.timeouts.min_secs,
        "default_timeout": d.timeouts.default_secs,
        "max_timeout": d.timeouts.max_secs,
    })))
}

async fn exec_handler(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    body: std::result::Result<Json<ExecRequest>, JsonRejection>,
) -> ApiResult<Response> {
    // Authentication comes before body errors
    require_auth(&caller)?;
    let Json(request) = body?;

    match state.gateway.handle(&caller, request).await? {
        Dispatch::Completed(result) => Ok(Json(result).into_response()),
        Dispatch::Accepted(accepted) => Ok((StatusCode::ACCEPTED, Json(accepted)).into_response()),
    }
}

#[derive(Debug, Deserialize)]
struct JobListQuery {
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_jobs_handler(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Query(query): Query<JobListQuery>,
) -> ApiResult<Json<Value>> {
    require_auth(&caller)?;

    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(GatewayError::Validation)?;
    let limit = query.limit.unwrap_or(DEFAULT_JOB_LIST_LIMIT);

    let jobs = state.gateway.jobs().list_jobs(status, limit).await;
    Ok(Json(json!({ "count": jobs.len(), "jobs": jobs })))
}

async fn get_job_handler(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_auth(&caller)?;

    let job = state
        .gateway
        .jobs()
        .get_job(&id)
        .await
        .ok_or_else(|| GatewayError::not_found("Job not found"))?;
    serde_json::to_value(job)
        .map(Json)
        .map_err(|e| GatewayError::internal(format!("Failed to serialize job: {}", e)).into())
}

async fn delete_job_handler(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_auth(&caller)?;

    if !state.gateway.jobs().delete_job(&id).await {
        return Err(GatewayError::not_found("Job not found").into());
    }
    Ok(Json(json!({ "message": "Job deleted", "job_id": id })))
}

async fn stats_handler(
    State(state): State<AppState>,
    RequestCaller(caller): RequestCaller,
) -> ApiResult<Json<Value>> {
    require_auth(&caller)?;

    let stats = state.gateway.stats().await;
    serde_json::to_value(stats)
        .map(Json)
        .map_err(|e| GatewayError::internal(format!("Failed to serialize stats: {}", e)).into())
}

/// Metrics endpoint handler
async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.gateway.jobs().publish_gauges().await;

    match metrics::gather_metrics() {
        Ok(metrics_text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics_text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}
