//! Invoicing domain module: customer/vendor invoices and their payments.
//!
//! This crate contains the record shapes and state rules for invoices and
//! payments, implemented purely as deterministic domain logic (no IO, no storage).

pub mod invoice;
pub mod payment;

pub use invoice::{
    ContentLine, DRAFT_NAME, Invoice, InvoiceState, LineItem, MoveType, NewInvoice, PaymentState,
    StructuralKind, StructuralLine,
};
pub use payment::{
    PartnerType, Payment, PaymentMethodLine, PaymentRegistration, PaymentStatus, PaymentType,
    MANUAL_METHOD_CODE,
};
