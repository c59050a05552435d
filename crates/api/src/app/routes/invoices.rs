use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use ledgerbridge_core::InvoiceId;
use ledgerbridge_sync::UserFacingError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new().route("/:id/sync", post(sync_invoice))
}

/// "Sync invoice": confirm the invoice in the primary store and replicate it.
pub async fn sync_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match errors::parse_id(&id, "invoice") {
        Ok(v) => InvoiceId::new(v),
        Err(resp) => return resp,
    };

    // Store adapters may block on their own runtime handle.
    let result = tokio::task::spawn_blocking(move || {
        services.sync.replicate_invoice(user.user_id(), invoice_id)
    })
    .await;

    match result {
        Ok(Ok(target_invoice_id)) => (
            StatusCode::OK,
            Json(dto::InvoiceSyncResponse {
                synced: true,
                invoice_id,
                target_invoice_id,
            }),
        )
            .into_response(),
        Ok(Err(err)) => errors::sync_error_to_response(UserFacingError::from(err)),
        Err(join) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", join.to_string()),
    }
}
