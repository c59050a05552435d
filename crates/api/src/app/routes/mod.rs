use axum::Router;

pub mod invoices;
pub mod payments;
pub mod system;

/// Router for all endpoints that act on behalf of a user.
pub fn router() -> Router {
    Router::new()
        .nest("/invoices", invoices::router())
        .nest("/payments", payments::router())
}
