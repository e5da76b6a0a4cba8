use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use satchel_types::{Fault, FaultKind};

use crate::context::AppContext;
use crate::error::ApiError;

/// Header carrying the shared secret.
pub const SECRET_HEADER: &str = "x-satchel-secret";

/// Layer protecting every route except `info` and `public`. The presented
/// secret must match the configured one exactly; an unconfigured (empty)
/// secret rejects everything.
pub async fn require_secret(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    match presented {
        Some(secret) if !ctx.config.secret.is_empty() && secret == ctx.config.secret => {
            next.run(request).await
        }
        _ => {
            tracing::debug!(path = %request.uri().path(), "rejected request without valid secret");
            ApiError(Fault::new(FaultKind::Unauthenticated)).into_response()
        }
    }
}
