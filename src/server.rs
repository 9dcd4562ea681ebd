//! # Scan Proxy Server
//!
//! Small HTTP/1 server that keeps the provider credential on the server side.
//! Browsers post a base64 photo to `/api/scan` and get the extracted fields
//! back; the same listener serves liveness and Prometheus metrics.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn, Instrument};

use crate::config::ServerConfig;
use crate::errors::error_logging;
use crate::localization::LocalizationManager;
use crate::observability;
use crate::orchestrator::ExtractionOrchestrator;
use crate::scan_errors::ScanError;

pub const SCAN_PATH: &str = "/api/scan";
const DEFAULT_MIME_TYPE: &str = "image/jpeg";
const CORS_ALLOW_HEADERS: &str = "X-CSRF-Token, X-Requested-With, Accept, Accept-Version, Accept-Language, Content-Length, Content-MD5, Content-Type, Date, X-Api-Version";

/// Everything a request handler needs, shared across connections
pub struct AppState {
    pub orchestrator: ExtractionOrchestrator,
    pub localization: LocalizationManager,
    pub metrics: Option<PrometheusHandle>,
    pub prepare_images: bool,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        orchestrator: ExtractionOrchestrator,
        localization: LocalizationManager,
        server: &ServerConfig,
    ) -> Self {
        Self {
            orchestrator,
            localization,
            metrics: None,
            prepare_images: server.prepare_images,
            max_body_bytes: server.max_body_bytes,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Body of `POST /api/scan`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequestBody {
    pub base64_image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Bind the configured host (name or IP literal) and port
pub async fn bind(config: &ServerConfig) -> Result<TcpListener> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(
        "Scan server listening on {} ({}:{})",
        listener.local_addr()?,
        config.host,
        config.port
    );
    Ok(listener)
}

/// Bind the configured address and serve until the task is dropped
pub async fn serve(config: &ServerConfig, state: Arc<AppState>) -> Result<()> {
    let listener = bind(config).await?;
    serve_listener(listener, state).await
}

/// Accept loop over an already-bound listener
pub async fn serve_listener(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let state = state.clone();

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = hyper::service::service_fn(move |req: Request<hyper::body::Incoming>| {
                        let state = state.clone();
                        async move { handle_request(req, state).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error_logging::log_internal_error(&err, "scan_server", "serve_connection");
                    }
                });
            }
            Err(e) => {
                tracing::error!("Error accepting connection: {}", e);
            }
        }
    }
}

/// Route one request
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = observability::request_span(method.as_str(), &path);

    let response = async {
        match (&method, path.as_str()) {
            (&Method::OPTIONS, SCAN_PATH) => with_cors(Response::new(Full::new(Bytes::new()))),
            (&Method::POST, SCAN_PATH) => with_cors(handle_scan(req, &state).await),
            (_, SCAN_PATH) => with_cors(json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "Method Not Allowed" }),
            )),
            (&Method::GET, "/health/live") => text_response(StatusCode::OK, "OK".to_string()),
            (&Method::GET, "/metrics") => match &state.metrics {
                Some(handle) => text_response(StatusCode::OK, handle.render()),
                None => text_response(StatusCode::NOT_FOUND, "Not Found".to_string()),
            },
            _ => text_response(StatusCode::NOT_FOUND, "Not Found".to_string()),
        }
    }
    .instrument(span)
    .await;

    observability::record_request_metrics(method.as_str(), response.status().as_u16(), start.elapsed());
    Ok(response)
}

async fn handle_scan<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let language = state.localization.detect_language(
        req.headers()
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok()),
    );

    let body = match Limited::new(req.into_body(), state.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Rejected scan request body: {}", e);
            return bad_request(state, &language, format!("Unreadable request body: {}", e));
        }
    };

    let request: ScanRequestBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error_logging::log_validation_error(&e, "parse_scan_request", "json_body", None);
            return bad_request(state, &language, format!("Invalid JSON body: {}", e));
        }
    };

    let image_bytes = match decode_image_payload(&request.base64_image) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => return bad_request(state, &language, "base64Image is empty".to_string()),
        Err(e) => {
            error_logging::log_validation_error(&e, "decode_scan_image", "base64Image", None);
            return bad_request(state, &language, format!("base64Image is not valid base64: {}", e));
        }
    };

    let outcome = if state.prepare_images {
        let prep = &state.orchestrator.config().image_prep;
        state.orchestrator.scan_image(&image_bytes, prep).await
    } else {
        let mime_type = request.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
        state.orchestrator.extract(&image_bytes, mime_type).await
    };

    match outcome {
        Ok(outcome) => {
            let mut response = json_response(StatusCode::OK, json!(outcome.result));
            if let Ok(model) = HeaderValue::from_str(&outcome.model_identifier) {
                response.headers_mut().insert("x-scan-model", model);
            }
            response
                .headers_mut()
                .insert("x-scan-attempt", HeaderValue::from(outcome.attempt_index));
            response
        }
        Err(err) => scan_error_response(&err, state, &language),
    }
}

/// Accept plain base64 or a full `data:<mime>;base64,<data>` URL
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let data = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned)
}

fn scan_error_response(err: &ScanError, state: &AppState, language: &str) -> Response<Full<Bytes>> {
    let message = state.localization.scan_error_message(err, language);
    match err {
        ScanError::Configuration(detail) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "Server API Key is missing", "detail": detail, "message": message }),
        ),
        ScanError::ImageDecode(detail) => json_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Image could not be processed", "detail": detail, "message": message }),
        ),
        ScanError::AllProvidersExhausted { failures } => json_response(
            StatusCode::BAD_GATEWAY,
            json!({
                "error": "All models failed",
                "hint": err.hint(),
                "message": message,
                "details": failures,
            }),
        ),
    }
}

fn bad_request(state: &AppState, language: &str, detail: String) -> Response<Full<Bytes>> {
    let message = state
        .localization
        .get_message_in_language("scan-bad-request", language, None);
    json_response(
        StatusCode::BAD_REQUEST,
        json!({ "error": detail, "message": message }),
    )
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    headers.insert("access-control-allow-credentials", HeaderValue::from_static("true"));
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert("access-control-allow-methods", HeaderValue::from_static("POST,OPTIONS"));
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    response
}
