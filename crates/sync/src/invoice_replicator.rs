//! Invoice Replicator: copies a confirmed source invoice into the target store.

use std::collections::BTreeMap;

use ledgerbridge_accounting::{EntryRef, Tax};
use ledgerbridge_core::{AccountId, CustomerId, InvoiceId, JournalId, TaxId};
use ledgerbridge_infra::{ErpStore, SessionContext, StoreError, StoreSession};
use ledgerbridge_invoicing::{ContentLine, Invoice, LineItem, NewInvoice};
use ledgerbridge_parties::Customer;

use crate::error::SyncError;
use crate::resolver::EntityResolver;

pub const INVOICE_MODEL: &str = "account.move";
pub const ORIGIN_FIELD: &str = "original_invoice_id";
pub const INVOICE_SYNCED_NOTE: &str = "Invoice successfully synced.";

/// What the target schema supports, probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetCapabilities {
    /// Invoices can carry the source back-reference.
    pub origin_field: bool,
}

impl TargetCapabilities {
    pub fn probe(store: &dyn ErpStore, ctx: SessionContext) -> Result<Self, StoreError> {
        let session = store.open_session(ctx)?;
        let origin_field = session.has_field(INVOICE_MODEL, ORIGIN_FIELD)?;
        tracing::info!(store = %store.name(), origin_field, "target capabilities probed");
        Ok(Self { origin_field })
    }
}

/// Everything replication needs from the primary store, read in one go.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInvoice {
    pub invoice: Invoice,
    pub customer: Customer,
    /// Taxes referenced by the invoice's content lines.
    pub taxes: BTreeMap<TaxId, Tax>,
}

impl SourceInvoice {
    pub fn load(session: &dyn StoreSession, id: InvoiceId) -> Result<Self, SyncError> {
        let invoice = session
            .invoice(id)?
            .ok_or_else(|| SyncError::NotFound(format!("invoice {id}")))?;
        let customer = session
            .customer(invoice.customer)?
            .ok_or_else(|| SyncError::NotFound(format!("customer {} of invoice {id}", invoice.customer)))?;

        let mut taxes = BTreeMap::new();
        for line in &invoice.lines {
            if let LineItem::Content(content) = line {
                for tax_id in &content.tax_ids {
                    if taxes.contains_key(tax_id) {
                        continue;
                    }
                    if let Some(tax) = session.tax(*tax_id)? {
                        taxes.insert(*tax_id, tax);
                    }
                }
            }
        }
        Ok(Self { invoice, customer, taxes })
    }
}

/// Rebuild `lines` for the target, in sequence order.
///
/// Structural lines keep name and sequence only. Content lines keep their
/// figures, get `account` and the taxes `resolve_tax` maps; unmapped taxes are
/// dropped.
pub fn map_lines<F>(lines: &[LineItem], account: AccountId, mut resolve_tax: F) -> Result<Vec<LineItem>, StoreError>
where
    F: FnMut(TaxId) -> Result<Option<TaxId>, StoreError>,
{
    let mut ordered: Vec<&LineItem> = lines.iter().collect();
    ordered.sort_by_key(|l| l.sequence());

    let mut mapped = Vec::with_capacity(ordered.len());
    for line in ordered {
        match line {
            LineItem::Structural(structural) => mapped.push(LineItem::Structural(structural.clone())),
            LineItem::Content(content) => {
                let mut tax_ids = Vec::new();
                for tax in &content.tax_ids {
                    if let Some(target) = resolve_tax(*tax)? {
                        if !tax_ids.contains(&target) {
                            tax_ids.push(target);
                        }
                    }
                }
                mapped.push(LineItem::Content(ContentLine {
                    sequence: content.sequence,
                    name: content.name.clone(),
                    quantity: content.quantity,
                    price_unit: content.price_unit,
                    discount: content.discount,
                    tax_ids,
                    account: Some(account),
                }));
            }
        }
    }
    Ok(mapped)
}

pub struct InvoiceReplicator<'a> {
    target: &'a dyn ErpStore,
    resolver: &'a dyn EntityResolver,
    capabilities: TargetCapabilities,
}

impl<'a> InvoiceReplicator<'a> {
    pub fn new(target: &'a dyn ErpStore, resolver: &'a dyn EntityResolver, capabilities: TargetCapabilities) -> Self {
        Self {
            target,
            resolver,
            capabilities,
        }
    }

    /// Session on the target that sees every partition.
    pub fn open(&self, ctx: SessionContext) -> Result<Box<dyn StoreSession + 'a>, SyncError> {
        let partitions = self.target.partitions()?;
        let ctx = ctx.with_all_partitions(&partitions).ok_or_else(|| {
            SyncError::ConfigurationMissing(format!("no partitions in store {}", self.target.name()))
        })?;
        Ok(self.target.open_session(ctx)?)
    }

    /// Resolve or create the target customer and commit it.
    pub fn resolve_customer(&self, session: &mut dyn StoreSession, source: &Customer) -> Result<CustomerId, SyncError> {
        self.resolver
            .resolve_or_create_customer(session, source)
            .and_then(|id| session.commit().map(|()| id))
            .map_err(|e| {
                tracing::error!(customer = %source.name, error = %e, "customer resolution failed");
                SyncError::ReplicationFailed(e.to_string())
            })
    }

    /// Replica created by an earlier run, found through the back-reference.
    pub fn find_existing(&self, session: &dyn StoreSession, source: InvoiceId) -> Result<Option<InvoiceId>, SyncError> {
        if !self.capabilities.origin_field {
            return Ok(None);
        }
        Ok(session.find_invoice_by_origin(source)?.map(|inv| inv.id))
    }

    /// First sale journal of the target and its default account.
    pub fn sale_journal(&self, session: &dyn StoreSession) -> Result<(JournalId, AccountId), SyncError> {
        let journal = session
            .sale_journals()?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::ConfigurationMissing("no sales journal in target store".to_string()))?;
        let account = journal.default_account.ok_or_else(|| {
            SyncError::ConfigurationMissing(format!("journal {} has no default account", journal.name))
        })?;
        Ok((journal.id, account))
    }

    /// Create the draft replica and commit it.
    pub fn create_target(
        &self,
        session: &mut dyn StoreSession,
        source: &SourceInvoice,
        customer: CustomerId,
    ) -> Result<InvoiceId, SyncError> {
        let (journal, account) = self.sale_journal(&*session)?;

        let lines = map_lines(&source.invoice.lines, account, |tax_id| match source.taxes.get(&tax_id) {
            Some(tax) => self.resolver.resolve_tax(&*session, tax),
            None => Ok(None),
        })
        .map_err(|e| SyncError::ReplicationFailed(e.to_string()))?;

        let values = NewInvoice {
            customer,
            move_type: source.invoice.move_type,
            journal,
            invoice_date: source.invoice.invoice_date,
            due_date: source.invoice.due_date,
            payment_reference: source.invoice.payment_reference.clone(),
            lines,
            original_invoice_id: self.capabilities.origin_field.then_some(source.invoice.id),
        };

        let id = session
            .create_invoice(values)
            .and_then(|id| session.commit().map(|()| id))
            .map_err(|e| {
                tracing::error!(source_invoice = %source.invoice.id, error = %e, "target invoice creation failed");
                SyncError::ReplicationFailed(e.to_string())
            })?;
        tracing::info!(source_invoice = %source.invoice.id, target_invoice = %id, "invoice created in target store");
        Ok(id)
    }

    /// Whole replication without saga bookkeeping: customer, then the draft.
    pub fn replicate(&self, ctx: SessionContext, source: &SourceInvoice) -> Result<InvoiceId, SyncError> {
        let mut session = self.open(ctx)?;
        let customer = self.resolve_customer(&mut *session, &source.customer)?;
        if let Some(existing) = self.find_existing(&*session, source.invoice.id)? {
            tracing::info!(source_invoice = %source.invoice.id, target_invoice = %existing, "adopting existing replica");
            return Ok(existing);
        }
        self.create_target(&mut *session, source, customer)
    }
}

/// Mark the source invoice synced and leave the audit note.
pub fn flag_source_invoice(store: &dyn ErpStore, ctx: SessionContext, id: InvoiceId) -> Result<(), SyncError> {
    let mut session = store.open_session(ctx)?;
    session
        .mark_invoice_synced(id)
        .and_then(|()| session.post_note(EntryRef::Invoice(id), INVOICE_SYNCED_NOTE))
        .and_then(|()| session.commit())
        .map_err(|e| {
            tracing::error!(invoice_id = %id, error = %e, "flagging source invoice failed");
            SyncError::ReplicationFailed(e.to_string())
        })
}
