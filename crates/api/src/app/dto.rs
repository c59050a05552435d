use serde::{Deserialize, Serialize};

use ledgerbridge_core::{InvoiceId, PaymentId};
use ledgerbridge_sync::PaymentOutcome;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct MarkSentRequest {
    pub payment_ids: Vec<PaymentId>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct InvoiceSyncResponse {
    pub synced: bool,
    pub invoice_id: InvoiceId,
    pub target_invoice_id: InvoiceId,
}

#[derive(Debug, Serialize)]
pub struct PaymentSyncResponse {
    pub synced: bool,
    pub payment_id: PaymentId,
    pub target_payment_id: PaymentId,
}

#[derive(Debug, Serialize)]
pub struct MarkSentResponse {
    pub results: Vec<PaymentOutcome>,
}
