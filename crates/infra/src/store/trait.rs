use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerbridge_accounting::{EntryRef, Journal, LedgerLine, ReconcileOutcome, Tax};
use ledgerbridge_core::{
    CustomerId, DomainError, InvoiceId, JournalId, LedgerLineId, PartitionId, PaymentId,
    PaymentMethodLineId, StoreName, TaxId, UserId,
};
use ledgerbridge_invoicing::{Invoice, NewInvoice, Payment, PaymentMethodLine, PaymentRegistration, PaymentState};
use ledgerbridge_parties::{Customer, CustomerDraft};

use crate::schema::SchemaCatalog;
use crate::session::SessionContext;

/// Store operations that can fail independently (used for error context and
/// failure injection in the in-memory store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    OpenSession,
    Commit,
    SetInvoiceJournal,
    PostInvoice,
    CreateInvoice,
    MarkInvoiceSynced,
    SetPaymentState,
    CreateCustomer,
    RegisterPayment,
    MarkPaymentSynced,
    MarkPaymentSent,
    Reconcile,
    PostNote,
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Operation::OpenSession => "open_session",
            Operation::Commit => "commit",
            Operation::SetInvoiceJournal => "set_invoice_journal",
            Operation::PostInvoice => "post_invoice",
            Operation::CreateInvoice => "create_invoice",
            Operation::MarkInvoiceSynced => "mark_invoice_synced",
            Operation::SetPaymentState => "set_payment_state",
            Operation::CreateCustomer => "create_customer",
            Operation::RegisterPayment => "register_payment",
            Operation::MarkPaymentSynced => "mark_payment_synced",
            Operation::MarkPaymentSent => "mark_payment_sent",
            Operation::Reconcile => "reconcile",
            Operation::PostNote => "post_note",
        };
        f.write_str(s)
    }
}

/// Store operation error.
///
/// These are **store errors** (availability, missing records, rejected writes)
/// as opposed to the sync taxonomy built on top of them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("store {0} is not available")]
    Unavailable(StoreName),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{operation} rejected: {source}")]
    Rejected {
        operation: Operation,
        #[source]
        source: DomainError,
    },

    #[error("{operation} failed: {message}")]
    Failed { operation: Operation, message: String },

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn rejected(operation: Operation, source: DomainError) -> Self {
        Self::Rejected { operation, source }
    }
}

/// Audit note posted on a record's discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub record: EntryRef,
    pub author: UserId,
    pub body: String,
}

/// A store that replication reads from or writes to.
pub trait ErpStore: Send + Sync {
    fn name(&self) -> &StoreName;

    /// Every organizational partition the store defines (metadata, unscoped).
    fn partitions(&self) -> Result<Vec<PartitionId>, StoreError>;

    /// Open a transactional session.
    ///
    /// Writes are staged until [`StoreSession::commit`]; dropping a session
    /// discards whatever was not committed.
    fn open_session(&self, ctx: SessionContext) -> Result<Box<dyn StoreSession + '_>, StoreError>;

    /// Live schema of this store. Columns added here are what
    /// [`StoreSession::has_field`] reports.
    fn schema_catalog(&self) -> &dyn SchemaCatalog;
}

impl<S> ErpStore for Arc<S>
where
    S: ErpStore + ?Sized,
{
    fn name(&self) -> &StoreName {
        (**self).name()
    }

    fn partitions(&self) -> Result<Vec<PartitionId>, StoreError> {
        (**self).partitions()
    }

    fn open_session(&self, ctx: SessionContext) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        (**self).open_session(ctx)
    }

    fn schema_catalog(&self) -> &dyn SchemaCatalog {
        (**self).schema_catalog()
    }
}

/// Transactional view of one store under one [`SessionContext`].
///
/// Lookups only see records inside the session's partition scope.
pub trait StoreSession {
    fn context(&self) -> &SessionContext;

    // Invoices
    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;
    fn find_invoices_by_name(&self, name: &str) -> Result<Vec<Invoice>, StoreError>;
    /// Replica of a source invoice, via the back-reference field.
    fn find_invoice_by_origin(&self, source: InvoiceId) -> Result<Option<Invoice>, StoreError>;
    fn set_invoice_journal(&mut self, id: InvoiceId, journal: JournalId) -> Result<(), StoreError>;
    fn post_invoice(&mut self, id: InvoiceId) -> Result<(), StoreError>;
    /// Create a draft invoice.
    fn create_invoice(&mut self, values: NewInvoice) -> Result<InvoiceId, StoreError>;
    fn mark_invoice_synced(&mut self, id: InvoiceId) -> Result<(), StoreError>;
    fn set_invoice_payment_state(&mut self, id: InvoiceId, state: PaymentState) -> Result<(), StoreError>;

    // Customers
    fn customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;
    fn find_customer_by_name(&self, name: &str) -> Result<Option<Customer>, StoreError>;
    fn create_customer(&mut self, draft: CustomerDraft) -> Result<CustomerId, StoreError>;

    // Accounting configuration
    fn tax(&self, id: TaxId) -> Result<Option<Tax>, StoreError>;
    fn find_tax_by_name(&self, name: &str) -> Result<Option<Tax>, StoreError>;
    fn sale_journals(&self) -> Result<Vec<Journal>, StoreError>;

    // Payments
    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;
    fn payment_method_line(&self, id: PaymentMethodLineId) -> Result<Option<PaymentMethodLine>, StoreError>;
    fn find_payment_method_line_by_name(&self, name: &str) -> Result<Option<PaymentMethodLine>, StoreError>;
    fn first_payment_method_line(&self) -> Result<Option<PaymentMethodLine>, StoreError>;
    /// Run the store's payment-registration workflow against one posted invoice.
    fn register_payment(&mut self, registration: PaymentRegistration) -> Result<PaymentId, StoreError>;
    fn mark_payment_synced(&mut self, id: PaymentId) -> Result<(), StoreError>;
    fn mark_payment_sent(&mut self, id: PaymentId) -> Result<(), StoreError>;

    // Ledger
    fn ledger_lines(&self, entry: EntryRef) -> Result<Vec<LedgerLine>, StoreError>;
    fn reconcile(&mut self, lines: &[LedgerLineId]) -> Result<ReconcileOutcome, StoreError>;

    // Audit + schema
    fn post_note(&mut self, record: EntryRef, body: &str) -> Result<(), StoreError>;
    /// Whether `model` defines `field` in this store's live schema.
    fn has_field(&self, model: &str, field: &str) -> Result<bool, StoreError>;

    /// Publish staged writes; the session stays usable afterwards.
    fn commit(&mut self) -> Result<(), StoreError>;
}
