//! HTTP transport
//!
//! Serves the dispatcher over loopback HTTP. Every operation is reachable at
//! `POST /api/{version}/{operation}` with its JSON request as the body; the
//! reply is always the [`ApiResponse`] envelope.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use tokio::net::TcpListener;

use crate::api::Dispatcher;
use crate::error::{ErrorKind, ProxyError};
use crate::os::OsError;

/// Response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// Error half of the envelope
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(err: &ProxyError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }
}

/// An operation and the versions it is served at, newest first
#[derive(Debug, Serialize)]
pub struct OperationInfo {
    pub name: String,
    pub versions: Vec<String>,
}

/// HTTP status for a failed request
pub fn status_for(err: &ProxyError) -> StatusCode {
    match err.kind() {
        ErrorKind::InvalidVersion | ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::UnknownOperation | ErrorKind::UnsupportedVersion => StatusCode::NOT_FOUND,
        ErrorKind::SessionNotFound => StatusCode::NOT_FOUND,
        ErrorKind::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        ErrorKind::DuplicateRegistration | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => match err.os_cause() {
            Some(OsError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(OsError::AlreadyExists(_)) | Some(OsError::Busy(_)) => StatusCode::CONFLICT,
            Some(OsError::Authentication(_)) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

/// Build the API router
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/api/operations", get(list_operations))
        .route("/api/{version}/{operation}", post(call_operation))
        .with_state(dispatcher)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, dispatcher: Dispatcher, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    log::info!("csi-proxy API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn list_operations(State(dispatcher): State<Dispatcher>) -> Json<ApiResponse<Vec<OperationInfo>>> {
    let operations: Vec<OperationInfo> = dispatcher
        .registry()
        .operations()
        .into_iter()
        .map(|(name, versions)| OperationInfo {
            name: name.to_string(),
            versions: versions.iter().map(|v| v.to_string()).collect(),
        })
        .collect();
    Json(ApiResponse::success(operations))
}

async fn call_operation(
    State(dispatcher): State<Dispatcher>,
    Path((version, operation)): Path<(String, String)>,
    body: Bytes,
) -> (StatusCode, Json<ApiResponse<Value>>) {
    let result = match parse_body(&body) {
        Ok(payload) => {
            // Handlers block on OS calls
            tokio::task::spawn_blocking(move || dispatcher.dispatch(&operation, &version, payload))
                .await
                .unwrap_or_else(|e| Err(ProxyError::Internal(format!("handler panicked: {}", e))))
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => (status_for(&e), Json(ApiResponse::error(&e))),
    }
}

/// Decode a request body. An empty body is an empty request.
fn parse_body(body: &[u8]) -> Result<Value, ProxyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidArgument(format!("malformed request body: {}", e)))
}
