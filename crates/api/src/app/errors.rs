use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use ledgerbridge_sync::{SyncErrorKind, UserFacingError};

pub fn sync_error_to_response(err: UserFacingError) -> axum::response::Response {
    let status = match err.kind {
        SyncErrorKind::NotFound | SyncErrorKind::InvoiceNotFound => StatusCode::NOT_FOUND,
        SyncErrorKind::InvoiceNotPosted | SyncErrorKind::SyncInProgress => StatusCode::CONFLICT,
        SyncErrorKind::ConfigurationMissing | SyncErrorKind::NoPaymentMethod => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SyncErrorKind::ConfirmationFailed
        | SyncErrorKind::ReplicationFailed
        | SyncErrorKind::PaymentSyncFailed
        | SyncErrorKind::ReconciliationFailed
        | SyncErrorKind::Store
        | SyncErrorKind::SagaLog => StatusCode::BAD_GATEWAY,
    };
    json_error(status, err.kind.as_str(), err.message)
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

pub fn parse_id(raw: &str, what: &str) -> Result<u64, axum::response::Response> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
