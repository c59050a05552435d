use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use ledgerbridge_core::PaymentId;
use ledgerbridge_sync::UserFacingError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/mark-sent", post(mark_sent))
        .route("/:id/sync", post(sync_payment))
}

/// "Sync payment": register the payment against the replicated invoice.
pub async fn sync_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let payment_id = match errors::parse_id(&id, "payment") {
        Ok(v) => PaymentId::new(v),
        Err(resp) => return resp,
    };

    let result = tokio::task::spawn_blocking(move || {
        services.sync.replicate_payment(user.user_id(), payment_id)
    })
    .await;

    match result {
        Ok(Ok(target_payment_id)) => (
            StatusCode::OK,
            Json(dto::PaymentSyncResponse {
                synced: true,
                payment_id,
                target_payment_id,
            }),
        )
            .into_response(),
        Ok(Err(err)) => errors::sync_error_to_response(UserFacingError::from(err)),
        Err(join) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", join.to_string()),
    }
}

/// "Mark as sent" over a batch; always 200 with one outcome per payment.
pub async fn mark_sent(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<dto::MarkSentRequest>,
) -> axum::response::Response {
    if body.payment_ids.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "payment_ids must not be empty");
    }

    let result = tokio::task::spawn_blocking(move || {
        services.sync.mark_payments_sent(user.user_id(), &body.payment_ids)
    })
    .await;

    match result {
        Ok(results) => Json(dto::MarkSentResponse { results }).into_response(),
        Err(join) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", join.to_string()),
    }
}
