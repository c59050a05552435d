//! Payment Replicator: registers a source payment against its replicated invoice.

use ledgerbridge_accounting::EntryRef;
use ledgerbridge_core::{CustomerId, JournalId, PaymentId};
use ledgerbridge_infra::{ErpStore, SessionContext, StoreSession};
use ledgerbridge_invoicing::{Payment, PaymentRegistration};
use ledgerbridge_parties::Customer;

use crate::error::SyncError;
use crate::resolver::EntityResolver;

pub const PAYMENT_SYNCED_NOTE: &str = "Payment successfully synced.";

#[derive(Debug, Clone, PartialEq)]
pub struct SourcePayment {
    pub payment: Payment,
    pub customer: Customer,
    /// Display name of the payment's method line, if it has one.
    pub method_name: Option<String>,
}

impl SourcePayment {
    pub fn load(session: &dyn StoreSession, id: PaymentId) -> Result<Self, SyncError> {
        let payment = session
            .payment(id)?
            .ok_or_else(|| SyncError::NotFound(format!("payment {id}")))?;
        let customer = session
            .customer(payment.partner)?
            .ok_or_else(|| SyncError::NotFound(format!("partner {} of payment {id}", payment.partner)))?;
        let method_name = match payment.payment_method_line {
            Some(line) => session.payment_method_line(line)?.map(|l| l.name),
            None => None,
        };
        Ok(Self {
            payment,
            customer,
            method_name,
        })
    }

    /// Name of the target invoice this payment settles.
    pub fn reference(&self) -> Result<&str, SyncError> {
        self.payment.invoice_reference().ok_or_else(|| {
            SyncError::PaymentSyncFailed(format!("payment {} has no invoice reference", self.payment.name))
        })
    }
}

pub struct PaymentReplicator<'a> {
    target: &'a dyn ErpStore,
    resolver: &'a dyn EntityResolver,
    journal: JournalId,
}

impl<'a> PaymentReplicator<'a> {
    pub fn new(target: &'a dyn ErpStore, resolver: &'a dyn EntityResolver, journal: JournalId) -> Self {
        Self {
            target,
            resolver,
            journal,
        }
    }

    /// Register `source` in the target store and commit.
    ///
    /// The customer is committed before the invoice lookup, so it survives a
    /// later failure.
    pub fn replicate(&self, ctx: SessionContext, source: &SourcePayment) -> Result<PaymentId, SyncError> {
        let reference = source.reference()?;

        let partitions = self.target.partitions().map_err(payment_failed)?;
        let ctx = ctx.with_all_partitions(&partitions).ok_or_else(|| {
            SyncError::ConfigurationMissing(format!("no partitions in store {}", self.target.name()))
        })?;
        let mut session = self.target.open_session(ctx).map_err(payment_failed)?;

        let customer: CustomerId = self
            .resolver
            .resolve_or_create_customer(&mut *session, &source.customer)
            .and_then(|id| session.commit().map(|()| id))
            .map_err(payment_failed)?;

        tracing::info!(reference, "looking up target invoice");
        let invoice = self
            .resolver
            .locate_invoice(&*session, reference)
            .map_err(payment_failed)?
            .ok_or_else(|| SyncError::InvoiceNotFound(reference.to_string()))?;
        if !invoice.is_posted() {
            return Err(SyncError::InvoiceNotPosted(invoice.name));
        }

        let method = self
            .resolver
            .resolve_payment_method(&*session, source.method_name.as_deref())
            .map_err(payment_failed)?
            .ok_or(SyncError::NoPaymentMethod)?;

        let registration = PaymentRegistration {
            invoice: invoice.id,
            amount: source.payment.amount,
            payment_date: source.payment.date,
            journal: self.journal,
            payment_method_line: method.id,
            payment_type: source.payment.payment_type,
            partner_type: source.payment.partner_type,
            partner: customer,
            currency: source.payment.currency,
        };
        let id = session
            .register_payment(registration)
            .and_then(|id| session.commit().map(|()| id))
            .map_err(payment_failed)?;
        tracing::info!(source_payment = %source.payment.id, target_payment = %id, invoice = %invoice.name, "payment registered in target store");
        Ok(id)
    }
}

fn payment_failed(err: impl std::fmt::Display) -> SyncError {
    tracing::error!(error = %err, "payment replication step failed");
    SyncError::PaymentSyncFailed(err.to_string())
}

/// Mark the source payment synced and leave the audit note.
pub fn flag_source_payment(store: &dyn ErpStore, ctx: SessionContext, id: PaymentId) -> Result<(), SyncError> {
    let mut session = store.open_session(ctx).map_err(payment_failed)?;
    session
        .mark_payment_synced(id)
        .and_then(|()| session.post_note(EntryRef::Payment(id), PAYMENT_SYNCED_NOTE))
        .and_then(|()| session.commit())
        .map_err(payment_failed)
}
