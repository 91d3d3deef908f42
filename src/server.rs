//! HTTP surface: submit markdown, fetch the generated PDF once.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /` | liveness text |
//! | `POST /generate-single-para` | `{"content": "<markdown>"}` → artifact reference |
//! | `GET /download/{filename}` | stream the PDF, then delete it |
//!
//! Response bodies are part of the public contract and are kept byte-stable;
//! internal error detail only ever appears in the `details` field of a 500.

use crate::artifact::Download;
use crate::convert::{ConversionRequest, Converter};
use crate::error::{Md2PdfError, ResolveError};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path as UrlPath, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

pub const HEALTH_TEXT: &str = "PDF Generator service is running.";
pub const SUCCESS_MESSAGE: &str = "PDF generated successfully.";
pub const GENERIC_FAILURE: &str = "An unexpected error occurred during PDF generation.";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub converter: Arc<Converter>,
}

/// Body of `POST /generate-single-para`.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateSuccess {
    pub success: bool,
    pub message: String,
    pub file_path: String,
    pub download_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateFailure {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Build the service router.
pub fn build_router(converter: Arc<Converter>) -> Router {
    let state = AppState { converter };
    Router::new()
        .route("/", get(health))
        .route("/generate-single-para", post(generate))
        .route("/download/{filename}", get(download))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(trace_requests))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    converter: Arc<Converter>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(converter);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    HEALTH_TEXT
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(body)) => ConversionRequest {
            content: body.content,
        },
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            warn!("Rejected oversized body: {}", rejection.body_text());
            return rejection.into_response();
        }
        Err(rejection) => {
            debug!("Rejected generate body: {}", rejection.body_text());
            return failure(StatusCode::BAD_REQUEST, &Md2PdfError::InvalidRequest);
        }
    };

    match state.converter.convert(request).await {
        Ok(reference) => Json(GenerateSuccess {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            file_path: reference.id.to_string(),
            download_url: reference.download_url,
        })
        .into_response(),
        Err(e) if e.is_client_error() => failure(StatusCode::BAD_REQUEST, &e),
        Err(e) => {
            error!("Error generating PDF: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, &e)
        }
    }
}

async fn download(State(state): State<AppState>, UrlPath(filename): UrlPath<String>) -> Response {
    match state.converter.store().open_for_download(&filename).await {
        Ok(download) => download_response(download),
        Err(e @ ResolveError::Forbidden) => (StatusCode::FORBIDDEN, e.to_string()).into_response(),
        Err(e @ ResolveError::NotFound) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

/// Logs each request inside a `request` span with its outcome and latency.
async fn trace_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let span = info_span!("request", %method, %path);

    async move {
        let start = Instant::now();
        let response = next.run(request).await;
        let status = response.status().as_u16();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if response.status().is_server_error() {
            error!(status, elapsed_ms, "request failed");
        } else if response.status().is_client_error() {
            warn!(status, elapsed_ms, "client request error");
        } else {
            info!(status, elapsed_ms, "request completed");
        }
        response
    }
    .instrument(span)
    .await
}

// ── Response helpers ─────────────────────────────────────────────────────

fn failure(status: StatusCode, err: &Md2PdfError) -> Response {
    let body = if status.is_client_error() {
        GenerateFailure {
            success: false,
            error: Md2PdfError::InvalidRequest.to_string(),
            details: None,
        }
    } else {
        GenerateFailure {
            success: false,
            error: GENERIC_FAILURE.to_string(),
            details: Some(err.to_string()),
        }
    };
    (status, Json(body)).into_response()
}

fn download_response(download: Download) -> Response {
    let filename = download.id().to_string();
    let len = download.len();
    let mut response = Response::new(Body::from_stream(download.into_stream()));

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    let safe_name = filename.replace('"', "'");
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{safe_name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    response
}
