//! HTTP server: the single-page UI plus the per-session phase API (single port).

use crate::config::{self, Config};
use crate::llm::{GeminiClient, Generate, ModelGateway, ModelHandle};
use crate::phases::{self, FirmwareRequest};
use crate::report;
use crate::session::{SessionHandle, SessionStore};
use crate::upload::{ImageError, UploadedImage};
use crate::web::protocol::{ApiError, ApiResponse};
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

static INDEX_HTML: &str = include_str!("../../assets/index.html");

/// Uploads above this are rejected by axum before reaching the handler.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Multipart field carrying the board photo.
const IMAGE_FIELD: &str = "image";

/// Shared state for the server (config, sessions, model).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub model: Arc<dyn Generate>,
    pub model_handle: ModelHandle,
}

impl AppState {
    async fn session(&self, id: &str) -> Result<SessionHandle, ApiError> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(|| ApiError::unknown_session(id))
    }
}

/// Resolve the credential and connect the model gateway. Either failing is fatal for startup.
pub async fn connect_gateway(config: &Config) -> Result<ModelGateway> {
    let api_key = config::resolve_api_key(config).ok_or_else(|| {
        anyhow::anyhow!(
            "Gemini API key not found (set GOOGLE_API_KEY or gemini.apiKey in the config file)"
        )
    })?;
    let timeout = config.gemini.request_timeout_secs.map(Duration::from_secs);
    let client = GeminiClient::new(config::resolve_api_base(config), api_key, timeout);
    log::info!("listing models from {}", client.base_url());
    ModelGateway::connect(client, config.gemini.model_priority.as_slice())
        .await
        .context("listing Gemini models")?
        .ok_or_else(|| {
            anyhow::anyhow!("could not find a working AI model (no model supports generateContent); check API quota")
        })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_http))
        .route("/api/session", post(create_session))
        .route("/api/session/:id", get(get_session).delete(delete_session))
        .route("/api/session/:id/diagnosis", post(diagnosis))
        .route("/api/session/:id/firmware", post(firmware))
        .route("/api/session/:id/impact", post(impact))
        .route("/api/session/:id/report", get(download_report))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Run the server; binds to config.server.bind:config.server.port.
/// Refuses to start without a credential or a usable model. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_server(config: Config) -> Result<()> {
    let bind = config.server.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "binding to {} exposes the demo (and its API quota) without auth",
            bind
        );
    }

    let gateway = connect_gateway(&config).await?;
    let model_handle = gateway.model().clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        sessions: Arc::new(match config.server.session_idle_secs {
            0 => SessionStore::new(),
            secs => SessionStore::with_idle_timeout(Duration::from_secs(secs)),
        }),
        model: Arc::new(gateway),
        model_handle,
    };

    let bind_addr = format!("{}:{}", bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("phoenix-eye listening on http://{}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited")?;
    log::info!("server stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health returns status and the selected model (for the sidebar and probes).
async fn health_http(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "model": state.model_handle.name,
        "port": state.config.server.port,
    }))
}

async fn create_session(State(state): State<AppState>) -> Json<ApiResponse> {
    let id = state.sessions.create().await;
    log::debug!("session created: {}", id);
    Json(ApiResponse::ok(json!({ "sessionId": id })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let handle = state.session(&id).await?;
    let ctx = handle.lock().await;
    Ok(Json(ApiResponse::ok(json!(ctx.view(&id)))))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    if !state.sessions.remove(&id).await {
        return Err(ApiError::unknown_session(&id));
    }
    log::debug!("session ended: {}", id);
    Ok(Json(ApiResponse::ok(json!({}))))
}

/// Pull the `image` field out of the multipart body.
async fn read_image_field(mut multipart: Multipart) -> Result<UploadedImage, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
        return Ok(UploadedImage::decode(bytes.to_vec(), filename.as_deref())?);
    }
    Err(ImageError::Empty.into())
}

/// POST /api/session/:id/diagnosis: multipart `image`; phase 1.
async fn diagnosis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ApiResponse>, ApiError> {
    let handle = state.session(&id).await?;
    let image = read_image_field(multipart).await?;
    let mut ctx = handle.lock().await;
    let text = phases::run_diagnosis(state.model.as_ref(), &mut ctx, &image)
        .await
        .inspect_err(|e| log::warn!("diagnosis failed for {}: {}", id, e))?;
    Ok(Json(ApiResponse::ok(json!({
        "diagnosisText": text,
        "phase1Complete": ctx.phase1_complete(),
    }))))
}

/// POST /api/session/:id/firmware: `{hardware?, goal?}`; phase 2.
async fn firmware(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FirmwareRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let handle = state.session(&id).await?;
    let mut ctx = handle.lock().await;
    let text = phases::run_firmware(state.model.as_ref(), &mut ctx, &req)
        .await
        .inspect_err(|e| log::warn!("firmware generation failed for {}: {}", id, e))?;
    Ok(Json(ApiResponse::ok(json!({
        "firmwareText": text,
        "language": "cpp",
    }))))
}

/// POST /api/session/:id/impact: phase 3; 409 until phase 1 has succeeded.
async fn impact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let handle = state.session(&id).await?;
    let mut ctx = handle.lock().await;
    let metrics = phases::run_impact(state.model.as_ref(), &mut ctx, &state.config.impact)
        .await
        .inspect_err(|e| log::warn!("impact estimation failed for {}: {}", id, e))?;
    let report = report::render_report(&ctx);
    Ok(Json(ApiResponse::ok(json!({
        "impact": metrics,
        "reportFilename": report.filename,
    }))))
}

/// GET /api/session/:id/report: plain-text attachment; 409 until phase 1 has succeeded.
async fn download_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state.session(&id).await?;
    let ctx = handle.lock().await;
    if !ctx.phase1_complete() {
        return Err(phases::PhaseError::DiagnosisRequired.into());
    }
    let report = report::render_report(&ctx);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", report.filename),
            ),
        ],
        report.body,
    )
        .into_response())
}
