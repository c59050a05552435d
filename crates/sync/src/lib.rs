//! Cross-store invoice and payment replication.
//!
//! Source Confirmer → Invoice Replicator for invoices, Payment Replicator for
//! payments, and the Reconciliation Finalizer for marking manual payments as
//! sent. [`SyncService`] wires them into user-triggered actions.

pub mod confirmer;
pub mod error;
pub mod invoice_replicator;
pub mod payment_replicator;
pub mod reconciliation;
pub mod resolver;
pub mod service;

pub use confirmer::SourceConfirmer;
pub use error::{SyncError, SyncErrorKind, UserFacingError};
pub use invoice_replicator::{InvoiceReplicator, SourceInvoice, TargetCapabilities, map_lines};
pub use payment_replicator::{PaymentReplicator, SourcePayment};
pub use reconciliation::{PaymentOutcome, ReconciliationFinalizer, SentOutcome, SkipReason};
pub use resolver::{EntityResolver, NameResolver};
pub use service::SyncService;
