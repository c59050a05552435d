//! Cross-store entity matching.
//!
//! Records in the two stores share no keys; they are paired by display name.
//! Callers only see [`EntityResolver`], so name matching can be replaced by an
//! identity-mapping table without touching the pipelines.

use ledgerbridge_accounting::Tax;
use ledgerbridge_core::{CustomerId, TaxId};
use ledgerbridge_infra::{StoreError, StoreSession};
use ledgerbridge_invoicing::{Invoice, PaymentMethodLine};
use ledgerbridge_parties::{Customer, CustomerDraft};

pub trait EntityResolver: Send + Sync {
    /// Target customer matching `source`, created (and left uncommitted) when absent.
    fn resolve_or_create_customer(
        &self,
        session: &mut dyn StoreSession,
        source: &Customer,
    ) -> Result<CustomerId, StoreError>;

    /// Target tax matching `source`; `None` when the target has no counterpart.
    fn resolve_tax(&self, session: &dyn StoreSession, source: &Tax) -> Result<Option<TaxId>, StoreError>;

    /// Payment method line matching `name`, falling back to any available line.
    fn resolve_payment_method(
        &self,
        session: &dyn StoreSession,
        name: Option<&str>,
    ) -> Result<Option<PaymentMethodLine>, StoreError>;

    /// Target invoice a payment reference points to.
    fn locate_invoice(&self, session: &dyn StoreSession, reference: &str) -> Result<Option<Invoice>, StoreError>;
}

/// Exact display-name matching.
///
/// A customer whose name is unchanged always resolves to the same target
/// record; a renamed customer gets a new one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameResolver;

impl EntityResolver for NameResolver {
    fn resolve_or_create_customer(
        &self,
        session: &mut dyn StoreSession,
        source: &Customer,
    ) -> Result<CustomerId, StoreError> {
        if let Some(existing) = session.find_customer_by_name(&source.name)? {
            tracing::debug!(customer = %source.name, customer_id = %existing.id, "customer matched by name");
            return Ok(existing.id);
        }
        let id = session.create_customer(CustomerDraft::copy_of(source))?;
        tracing::info!(customer = %source.name, customer_id = %id, "customer created in target store");
        Ok(id)
    }

    fn resolve_tax(&self, session: &dyn StoreSession, source: &Tax) -> Result<Option<TaxId>, StoreError> {
        let found = session.find_tax_by_name(&source.name)?.map(|t| t.id);
        if found.is_none() {
            tracing::debug!(tax = %source.name, "no tax of that name in target store; dropped");
        }
        Ok(found)
    }

    fn resolve_payment_method(
        &self,
        session: &dyn StoreSession,
        name: Option<&str>,
    ) -> Result<Option<PaymentMethodLine>, StoreError> {
        if let Some(name) = name {
            if let Some(line) = session.find_payment_method_line_by_name(name)? {
                return Ok(Some(line));
            }
            tracing::warn!(payment_method = name, "payment method not found in target store; using default");
        }
        session.first_payment_method_line()
    }

    /// Posted matches win over drafts sharing the same name.
    fn locate_invoice(&self, session: &dyn StoreSession, reference: &str) -> Result<Option<Invoice>, StoreError> {
        let mut candidates = session.find_invoices_by_name(reference)?;
        let posted = candidates.iter().position(Invoice::is_posted);
        Ok(match posted {
            Some(index) => Some(candidates.swap_remove(index)),
            None => candidates.into_iter().next(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbridge_core::{CustomerId, InvoiceId, PartitionId, PaymentMethodLineId, StoreName, UserId};
    use ledgerbridge_infra::{ErpStore, InMemoryErpStore, SessionContext};
    use ledgerbridge_invoicing::{InvoiceState, MoveType, PaymentState};
    use ledgerbridge_parties::ContactInfo;

    fn store() -> InMemoryErpStore {
        let store = InMemoryErpStore::new(StoreName::new("TARGET").unwrap());
        store.add_partition(PartitionId::new(1)).unwrap();
        store
    }

    fn ctx(store: &InMemoryErpStore) -> SessionContext {
        SessionContext::new(store.name().clone(), UserId::new(1))
    }

    fn customer(name: &str) -> Customer {
        Customer {
            id: CustomerId::new(900),
            name: name.to_string(),
            contact: ContactInfo::default(),
            customer_rank: 1,
            partition: None,
        }
    }

    fn invoice(id: u64, state: InvoiceState) -> Invoice {
        Invoice {
            id: InvoiceId::new(id),
            name: "INV/2024/0007".to_string(),
            move_type: MoveType::OutInvoice,
            state,
            payment_state: PaymentState::NotPaid,
            customer: CustomerId::new(1),
            journal: None,
            invoice_date: None,
            due_date: None,
            payment_reference: None,
            lines: Vec::new(),
            original_invoice_id: None,
            synced: false,
            partition: Some(PartitionId::new(1)),
        }
    }

    #[test]
    fn same_named_customer_is_reused() {
        let store = store();
        let resolver = NameResolver;

        let mut session = store.open_session(ctx(&store)).unwrap();
        let first = resolver.resolve_or_create_customer(&mut *session, &customer("Acme")).unwrap();
        session.commit().unwrap();

        let mut session = store.open_session(ctx(&store)).unwrap();
        let second = resolver.resolve_or_create_customer(&mut *session, &customer("Acme")).unwrap();
        session.commit().unwrap();

        assert_eq!(first, second);
        assert_eq!(store.customers().len(), 1);
    }

    #[test]
    fn unknown_payment_method_falls_back_to_first_line() {
        let store = store();
        store
            .insert_payment_method_line(PaymentMethodLine {
                id: PaymentMethodLineId::new(4),
                name: "Manual Payment".to_string(),
                code: "manual".to_string(),
                journal: None,
            })
            .unwrap();
        let session = store.open_session(ctx(&store)).unwrap();

        let line = NameResolver
            .resolve_payment_method(&*session, Some("Wire"))
            .unwrap()
            .unwrap();
        assert_eq!(line.id, PaymentMethodLineId::new(4));
    }

    #[test]
    fn posted_invoice_wins_over_draft_of_same_name() {
        let store = store();
        store.insert_invoice(invoice(1, InvoiceState::Draft)).unwrap();
        store.insert_invoice(invoice(2, InvoiceState::Posted)).unwrap();
        let session = store.open_session(ctx(&store)).unwrap();

        let found = NameResolver.locate_invoice(&*session, "INV/2024/0007").unwrap().unwrap();
        assert_eq!(found.id, InvoiceId::new(2));
        assert!(NameResolver.locate_invoice(&*session, "INV/2024/0008").unwrap().is_none());
    }
}
