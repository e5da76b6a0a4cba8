use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use satchel_types::{Fault, FaultKind};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// A [`Fault`] on its way out as an HTTP response.
///
/// Bodies are `{status, message}` plus an `err` detail when one exists;
/// `status` is the protocol error code, not the HTTP status.
#[derive(Debug)]
pub struct ApiError(pub Fault);

impl From<Fault> for ApiError {
    fn from(fault: Fault) -> Self {
        Self(fault)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn http_status(kind: FaultKind) -> StatusCode {
    match kind {
        FaultKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        FaultKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let fault = self.0;
        let mut body = json!({
            "status": fault.kind.code(),
            "message": fault.kind.message(),
        });
        if let Some(detail) = &fault.detail {
            body["err"] = json!(detail);
        }
        let mut response = (http_status(fault.kind), Json(body)).into_response();
        if fault.kind == FaultKind::Unauthenticated {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("satchel-secret"),
            );
        }
        response
    }
}
