use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use agrochain_core::{DomainError, DomainResult};
use agrochain_infra::OutboxError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DomainError::InvalidArgument(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_argument", msg)
        }
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::DeliveryFailure(msg) => {
            json_error(StatusCode::BAD_GATEWAY, "delivery_failure", msg)
        }
        DomainError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
    }
}

pub fn outbox_error_to_response(err: OutboxError) -> axum::response::Response {
    match err {
        OutboxError::NotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no dead letter with id {id}"),
        ),
        OutboxError::AlreadyExists(id) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("delivery {id} already queued"),
        ),
        OutboxError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path id, answering 400 `invalid_id` on failure.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid id: {raw}")))
}

/// Run a service call on the blocking pool.
///
/// Service calls write snapshots and may deliver events inline, so they stay
/// off the async workers. Domain errors come back as JSON error responses.
pub async fn blocking<T, F>(f: F) -> Result<T, axum::response::Response>
where
    F: FnOnce() -> DomainResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(domain_error_to_response(e)),
        Err(e) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            format!("service call failed: {e}"),
        )),
    }
}
