//! Reconciliation Finalizer: marks manual payments as sent in the primary store
//! and settles the invoice they reference.
//!
//! One session per payment, so a failure never undoes work already done for
//! earlier payments of the batch.

use serde::Serialize;

use ledgerbridge_accounting::{EntryRef, LedgerLine, open_reconcilable};
use ledgerbridge_core::{InvoiceId, PaymentId};
use ledgerbridge_infra::{ErpStore, SessionContext, StoreError, StoreSession};
use ledgerbridge_invoicing::{Invoice, MoveType, Payment, PaymentState};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    NotPosted,
    AlreadySent,
    NotManual,
    NoMatchingInvoice,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SentOutcome {
    /// Payment and invoice lines were reconciled.
    Reconciled { invoice: InvoiceId },
    /// The invoice had nothing open; it was marked paid directly.
    ForcedPaid { invoice: InvoiceId },
    /// The payment had no open lines to reconcile with.
    NothingToReconcile { invoice: InvoiceId },
    /// Reconciliation was refused; the payment is still marked sent.
    ReconciliationFailed { invoice: InvoiceId, reason: String },
    Skipped { reason: SkipReason },
    /// A store error stopped this payment; it was not marked sent.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOutcome {
    pub payment: PaymentId,
    pub sent: bool,
    #[serde(flatten)]
    pub outcome: SentOutcome,
}

pub struct ReconciliationFinalizer<'a> {
    store: &'a dyn ErpStore,
}

impl<'a> ReconciliationFinalizer<'a> {
    pub fn new(store: &'a dyn ErpStore) -> Self {
        Self { store }
    }

    /// Process every payment; one payment's failure never stops the batch.
    pub fn mark_sent(&self, ctx: &SessionContext, payments: &[PaymentId]) -> Vec<PaymentOutcome> {
        payments
            .iter()
            .map(|&payment| match self.process(ctx.clone(), payment) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(payment_id = %payment, error = %err, "payment could not be processed");
                    PaymentOutcome {
                        payment,
                        sent: false,
                        outcome: SentOutcome::Failed {
                            reason: err.to_string(),
                        },
                    }
                }
            })
            .collect()
    }

    fn process(&self, ctx: SessionContext, id: PaymentId) -> Result<PaymentOutcome, StoreError> {
        let skipped = |reason| PaymentOutcome {
            payment: id,
            sent: false,
            outcome: SentOutcome::Skipped { reason },
        };

        let mut session = self.store.open_session(ctx)?;
        let Some(payment) = session.payment(id)? else {
            tracing::warn!(payment_id = %id, "skipping payment: not found");
            return Ok(skipped(SkipReason::NotFound));
        };
        if let Some(reason) = ineligibility(&*session, &payment)? {
            tracing::warn!(payment = %payment.name, ?reason, "skipping payment");
            return Ok(skipped(reason));
        }

        let Some(invoice) = find_invoice(&*session, &payment)? else {
            tracing::warn!(payment = %payment.name, reference = ?payment.reference, "no matching invoice found");
            return Ok(skipped(SkipReason::NoMatchingInvoice));
        };
        tracing::info!(payment = %payment.name, invoice = %invoice.name, payment_state = ?invoice.payment_state, "found invoice");

        let payment_lines = open_reconcilable(&session.ledger_lines(EntryRef::Payment(id))?);
        let invoice_lines = open_reconcilable(&session.ledger_lines(EntryRef::Invoice(invoice.id))?);

        let outcome = if invoice_lines.is_empty() {
            tracing::warn!(invoice = %invoice.name, "no open invoice lines; marking invoice paid");
            session.set_invoice_payment_state(invoice.id, PaymentState::Paid)?;
            SentOutcome::ForcedPaid { invoice: invoice.id }
        } else if payment_lines.is_empty() {
            tracing::info!(payment = %payment.name, "no open payment lines to reconcile");
            SentOutcome::NothingToReconcile { invoice: invoice.id }
        } else {
            match reconcile(&mut *session, &invoice_lines, &payment_lines) {
                Ok(()) => {
                    tracing::info!(payment = %payment.name, invoice = %invoice.name, "reconciliation succeeded");
                    SentOutcome::Reconciled { invoice: invoice.id }
                }
                Err(err) => {
                    let err = SyncError::ReconciliationFailed(err.to_string());
                    tracing::error!(payment = %payment.name, invoice = %invoice.name, error = %err, "reconciliation failed");
                    SentOutcome::ReconciliationFailed {
                        invoice: invoice.id,
                        reason: err.to_string(),
                    }
                }
            }
        };

        session.mark_payment_sent(id)?;
        session.commit()?;
        tracing::info!(payment = %payment.name, "payment marked as sent");
        Ok(PaymentOutcome {
            payment: id,
            sent: true,
            outcome,
        })
    }
}

fn ineligibility(session: &dyn StoreSession, payment: &Payment) -> Result<Option<SkipReason>, StoreError> {
    if !payment.is_posted() {
        return Ok(Some(SkipReason::NotPosted));
    }
    if payment.sent {
        return Ok(Some(SkipReason::AlreadySent));
    }
    let manual = match payment.payment_method_line {
        Some(line) => session.payment_method_line(line)?.is_some_and(|l| l.is_manual()),
        None => false,
    };
    Ok((!manual).then_some(SkipReason::NotManual))
}

/// Posted customer or vendor invoice named after the payment reference.
fn find_invoice(session: &dyn StoreSession, payment: &Payment) -> Result<Option<Invoice>, StoreError> {
    let Some(reference) = payment.invoice_reference() else {
        return Ok(None);
    };
    Ok(session
        .find_invoices_by_name(reference)?
        .into_iter()
        .find(|inv| inv.is_posted() && matches!(inv.move_type, MoveType::OutInvoice | MoveType::InInvoice)))
}

fn reconcile(
    session: &mut dyn StoreSession,
    invoice_lines: &[LedgerLine],
    payment_lines: &[LedgerLine],
) -> Result<(), StoreError> {
    let ids: Vec<_> = invoice_lines.iter().chain(payment_lines).map(|l| l.id).collect();
    session.reconcile(&ids).map(|_| ())
}
