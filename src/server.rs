//! HTTP boundary.
//!
//! ## Routes
//!
//! - `GET  /health`             liveness check, `{"status":"ok"}`
//! - `GET  /supported-formats`  registry contents in registration order
//! - `POST /convert`            multipart upload (`file` part) + `?to_format=`
//! - `POST /convert-from-url`   JSON `{"url": ..., "to_format": ...}`
//!
//! Successful conversions are streamed straight from the workspace; the
//! workspace is removed once the body has been sent or the client goes away
//! (see [`crate::stream`]). Failures become a JSON body
//! `{"detail": ..., "kind": ...}` whose status depends only on
//! [`FailureKind`].

use crate::convert::Converter;
use crate::error::{ConvertError, FailureKind};
use crate::output::{ConversionRequest, ConvertedArtifact};
use crate::registry::DEFAULT_MIME_TYPE;
use crate::stream::stream_artifact;
use axum::{
    body::Body,
    extract::{
        multipart::MultipartError, rejection::QueryRejection, DefaultBodyLimit, Json, Multipart,
        Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Name of the multipart part carrying the upload.
pub const FILE_FIELD: &str = "file";

/// Anything outside this set is replaced in the plain `filename=` parameter.
static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._ ()+,-]").unwrap());

// ── Request / response bodies ────────────────────────────────────────────────

/// Query string of `POST /convert`.
#[derive(Debug, Deserialize)]
pub struct ConvertParams {
    pub to_format: String,
}

/// JSON body of `POST /convert-from-url`.
#[derive(Debug, Deserialize)]
pub struct UrlConvertRequest {
    pub url: String,
    pub to_format: String,
}

/// Error body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub detail: String,
    /// Stable snake_case failure class.
    pub kind: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct SupportedFormatsResponse {
    supported_conversions: Vec<String>,
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the application router.
///
/// The request body limit comes from
/// [`GatewayConfig::max_body_bytes`](crate::config::GatewayConfig::max_body_bytes).
pub fn router(converter: Converter) -> Router {
    let body_limit = converter.config().max_body_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/supported-formats", get(supported_formats))
        .route("/convert", post(convert_upload))
        .route("/convert-from-url", post(convert_from_url))
        .with_state(converter)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

/// Serve the router on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, converter: Converter) -> std::io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    if let Some(addr) = addr {
        info!("Listening on http://{addr}");
    }
    axum::serve(listener, router(converter))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested; draining in-flight requests");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn supported_formats(State(converter): State<Converter>) -> Json<SupportedFormatsResponse> {
    let supported_conversions = converter
        .registry()
        .supported_pairs()
        .iter()
        .map(ToString::to_string)
        .collect();
    Json(SupportedFormatsResponse {
        supported_conversions,
    })
}

async fn convert_upload(
    State(converter): State<Converter>,
    params: Result<Query<ConvertParams>, QueryRejection>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(|| {
        ApiError::Validation(format!("missing multipart part '{FILE_FIELD}'"))
    })?;

    let artifact = converter
        .convert(ConversionRequest::new(filename, bytes, params.to_format))
        .await?;
    artifact_response(artifact).await
}

async fn convert_from_url(
    State(converter): State<Converter>,
    Json(request): Json<UrlConvertRequest>,
) -> Result<Response, ApiError> {
    let artifact = converter
        .convert_from_url(&request.url, &request.to_format)
        .await?;
    artifact_response(artifact).await
}

async fn artifact_response(artifact: ConvertedArtifact) -> Result<Response, ApiError> {
    let content_type = HeaderValue::from_str(artifact.mime_type())
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE));
    let disposition = content_disposition(artifact.filename());
    let size = artifact.size();

    let body = Body::from_stream(stream_artifact(artifact).await?);

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

/// `attachment; filename="..."`, plus an RFC 5987 `filename*` when the name
/// is not representable as plain ASCII.
pub fn content_disposition(filename: &str) -> HeaderValue {
    let plain = UNSAFE_FILENAME_CHARS.replace_all(filename, "_");
    let value = if plain == filename {
        format!("attachment; filename=\"{plain}\"")
    } else {
        format!(
            "attachment; filename=\"{plain}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    /// The conversion itself failed.
    Convert(ConvertError),
    /// The request is well-formed HTTP but lacks a required input.
    Validation(String),
    /// The multipart body could not be decoded.
    Multipart(MultipartError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Convert(e) => status_for(e.kind()),
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Multipart(e) => e.status(),
        }
    }
}

/// Status code for a failure class.
pub fn status_for(kind: FailureKind) -> StatusCode {
    if kind.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Convert(e) => {
                let kind = e.kind();
                let detail = if kind == FailureKind::Internal {
                    error!("Conversion failed: {e}");
                    "Internal server error".to_string()
                } else {
                    e.to_string()
                };
                ErrorResponse {
                    detail,
                    kind: kind.to_string(),
                }
            }
            ApiError::Validation(detail) => ErrorResponse {
                detail,
                kind: "validation_error".to_string(),
            },
            ApiError::Multipart(e) => ErrorResponse {
                detail: e.body_text(),
                kind: "invalid_multipart".to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        ApiError::Convert(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart(err)
    }
}
