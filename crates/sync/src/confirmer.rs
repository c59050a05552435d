//! Source Confirmer: puts the originating invoice into the posted state.

use ledgerbridge_core::{InvoiceId, JournalId};
use ledgerbridge_infra::{ErpStore, SessionContext};
use ledgerbridge_invoicing::Invoice;

use crate::error::SyncError;

pub struct SourceConfirmer<'a> {
    store: &'a dyn ErpStore,
    journal: JournalId,
}

impl<'a> SourceConfirmer<'a> {
    pub fn new(store: &'a dyn ErpStore, journal: JournalId) -> Self {
        Self { store, journal }
    }

    /// Force the confirmation journal onto the invoice and post it if needed.
    ///
    /// Each step commits on its own. Posting is irreversible, so a later
    /// replication failure leaves the source posted.
    pub fn confirm(&self, ctx: SessionContext, id: InvoiceId) -> Result<Invoice, SyncError> {
        let mut session = self.store.open_session(ctx).map_err(SyncError::ConfirmationFailed)?;

        let invoice = session
            .invoice(id)
            .map_err(SyncError::ConfirmationFailed)?
            .ok_or_else(|| SyncError::NotFound(format!("invoice {id} in {}", self.store.name())))?;

        tracing::info!(invoice_id = %id, journal_id = %self.journal, "assigning confirmation journal");
        session
            .set_invoice_journal(id, self.journal)
            .and_then(|()| session.commit())
            .map_err(|e| {
                tracing::error!(invoice_id = %id, error = %e, "journal reassignment failed");
                SyncError::ConfirmationFailed(e)
            })?;

        if invoice.is_posted() {
            tracing::debug!(invoice_id = %id, "invoice already posted");
        } else {
            tracing::info!(invoice_id = %id, "posting invoice in primary store");
            session
                .post_invoice(id)
                .and_then(|()| session.commit())
                .map_err(|e| {
                    tracing::error!(invoice_id = %id, error = %e, "posting failed");
                    SyncError::ConfirmationFailed(e)
                })?;
        }

        session
            .invoice(id)
            .map_err(SyncError::ConfirmationFailed)?
            .ok_or_else(|| SyncError::NotFound(format!("invoice {id} in {}", self.store.name())))
    }
}
