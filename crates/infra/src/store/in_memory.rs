use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{Datelike, NaiveDate, Utc};

use ledgerbridge_accounting::{
    EntryRef, Journal, LedgerLine, ReconcileOutcome, ReconciliationPlan, Tax, open_reconcilable,
};
use ledgerbridge_core::{
    AccountId, CustomerId, DomainError, Entity, InvoiceId, JournalId, LedgerLineId, PartitionId,
    PaymentId, PaymentMethodLineId, StoreName, TaxId,
};
use ledgerbridge_invoicing::{
    DRAFT_NAME, Invoice, InvoiceState, LineItem, MoveType, NewInvoice, PartnerType, Payment,
    PaymentMethodLine, PaymentRegistration, PaymentState, PaymentStatus, PaymentType,
};
use ledgerbridge_parties::{Customer, CustomerDraft};

use super::r#trait::{ErpStore, Note, Operation, StoreError, StoreSession};
use crate::config::ColumnSpec;
use crate::schema::{SchemaCatalog, SchemaError, validate_spec};
use crate::session::{PartitionScope, SessionContext};

pub const RECEIVABLE_ACCOUNT: AccountId = AccountId::new(1200);
pub const PAYABLE_ACCOUNT: AccountId = AccountId::new(2200);
pub const BANK_ACCOUNT: AccountId = AccountId::new(1010);
pub const DEFAULT_INCOME_ACCOUNT: AccountId = AccountId::new(7000);

#[derive(Debug, Clone, Default)]
struct Tables {
    partitions: Vec<PartitionId>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    customers: BTreeMap<CustomerId, Customer>,
    taxes: BTreeMap<TaxId, Tax>,
    journals: BTreeMap<JournalId, Journal>,
    payments: BTreeMap<PaymentId, Payment>,
    method_lines: BTreeMap<PaymentMethodLineId, PaymentMethodLine>,
    ledger_lines: BTreeMap<LedgerLineId, LedgerLine>,
    notes: Vec<Note>,
    /// `(table, column)` → definition; `None` for columns seeded without one.
    columns: BTreeMap<(String, String), Option<String>>,
}

/// Store-wide counters. Shared by all sessions so concurrent sessions never
/// hand out the same id; values consumed by a discarded session leave gaps.
#[derive(Debug, Default)]
struct Sequences {
    last_id: AtomicU64,
    invoice: AtomicU32,
    payment: AtomicU32,
}

impl Sequences {
    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn reserve(&self, raw: u64) {
        self.last_id.fetch_max(raw, Ordering::SeqCst);
    }

    fn next_invoice(&self) -> u32 {
        self.invoice.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_payment(&self) -> u32 {
        self.payment.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Tables {
    fn default_partition(&self) -> Option<PartitionId> {
        self.partitions.first().copied()
    }

    fn visible(&self, scope: &PartitionScope, partition: Option<PartitionId>) -> bool {
        match partition {
            None => true,
            Some(p) => match scope {
                PartitionScope::Default => self.default_partition() == Some(p),
                PartitionScope::Explicit { allowed, .. } => allowed.contains(&p),
            },
        }
    }

    fn active_partition(&self, scope: &PartitionScope) -> Option<PartitionId> {
        match scope {
            PartitionScope::Default => self.default_partition(),
            PartitionScope::Explicit { active, .. } => Some(*active),
        }
    }

    fn invoice_total(&self, invoice: &Invoice) -> f64 {
        invoice
            .lines
            .iter()
            .filter_map(|l| match l {
                LineItem::Content(c) => Some(c),
                LineItem::Structural(_) => None,
            })
            .map(|c| {
                let rate: f64 = c
                    .tax_ids
                    .iter()
                    .filter_map(|t| self.taxes.get(t))
                    .map(|t| t.rate)
                    .sum();
                c.subtotal() * (1.0 + rate / 100.0)
            })
            .sum()
    }

    fn push_line(
        &mut self,
        seq: &Sequences,
        entry: EntryRef,
        account: AccountId,
        reconcilable: bool,
        debit: f64,
        credit: f64,
    ) {
        let id = LedgerLineId::new(seq.next_id());
        self.ledger_lines.insert(
            id,
            LedgerLine {
                id,
                entry,
                account,
                account_reconcilable: reconcilable,
                reconciled: false,
                debit,
                credit,
            },
        );
    }

    /// Partner line on receivable/payable plus one income/expense counterpart.
    fn book_invoice(&mut self, seq: &Sequences, invoice: &Invoice) {
        let total = self.invoice_total(invoice);
        let (partner_account, partner_debit) = match invoice.move_type {
            MoveType::OutInvoice => (RECEIVABLE_ACCOUNT, true),
            MoveType::OutRefund => (RECEIVABLE_ACCOUNT, false),
            MoveType::InInvoice => (PAYABLE_ACCOUNT, false),
            MoveType::InRefund => (PAYABLE_ACCOUNT, true),
            MoveType::Entry => return,
        };
        let counterpart = invoice
            .lines
            .iter()
            .find_map(|l| match l {
                LineItem::Content(c) => c.account,
                LineItem::Structural(_) => None,
            })
            .unwrap_or(DEFAULT_INCOME_ACCOUNT);
        let entry = EntryRef::Invoice(invoice.id);
        let (d, c) = if partner_debit { (total, 0.0) } else { (0.0, total) };
        self.push_line(seq, entry, partner_account, true, d, c);
        self.push_line(seq, entry, counterpart, false, c, d);
    }

    fn book_payment(&mut self, seq: &Sequences, payment: &Payment) {
        let partner_account = match payment.partner_type {
            PartnerType::Customer => RECEIVABLE_ACCOUNT,
            PartnerType::Supplier => PAYABLE_ACCOUNT,
        };
        let entry = EntryRef::Payment(payment.id);
        let amount = payment.amount;
        match payment.payment_type {
            PaymentType::Inbound => {
                self.push_line(seq, entry, BANK_ACCOUNT, false, amount, 0.0);
                self.push_line(seq, entry, partner_account, true, 0.0, amount);
            }
            PaymentType::Outbound => {
                self.push_line(seq, entry, BANK_ACCOUNT, false, 0.0, amount);
                self.push_line(seq, entry, partner_account, true, amount, 0.0);
            }
        }
    }

    fn apply_reconcile(&mut self, ids: &[LedgerLineId]) -> Result<ReconcileOutcome, DomainError> {
        let lines = ids
            .iter()
            .map(|id| self.ledger_lines.get(id).cloned().ok_or_else(|| DomainError::not_found(format!("ledger line {id}"))))
            .collect::<Result<Vec<_>, _>>()?;
        let plan = ReconciliationPlan::build(lines)?;
        let outcome = plan.outcome();

        let invoices: BTreeSet<InvoiceId> = ids
            .iter()
            .filter_map(|id| match self.ledger_lines.get(id).map(|l| l.entry) {
                Some(EntryRef::Invoice(inv)) => Some(inv),
                _ => None,
            })
            .collect();

        let new_state = match outcome {
            ReconcileOutcome::Full => {
                for id in plan.line_ids() {
                    if let Some(line) = self.ledger_lines.get_mut(&id) {
                        line.reconciled = true;
                    }
                }
                PaymentState::Paid
            }
            ReconcileOutcome::Partial { .. } => PaymentState::Partial,
        };
        for inv in invoices {
            if let Some(invoice) = self.invoices.get_mut(&inv) {
                invoice.payment_state = new_state;
            }
        }
        Ok(outcome)
    }

    /// Reconcile an invoice's open partner lines with the open lines of every
    /// payment referencing it on the same account. No-op when nothing matches.
    fn settle_invoice(&mut self, invoice: &Invoice) -> Result<Option<ReconcileOutcome>, DomainError> {
        let invoice_lines = open_reconcilable(&self.entry_lines(EntryRef::Invoice(invoice.id)));
        let Some(account) = invoice_lines.first().map(|l| l.account) else {
            return Ok(None);
        };
        let mut ids: Vec<LedgerLineId> = invoice_lines.iter().map(|l| l.id).collect();
        let payments: Vec<PaymentId> = self
            .payments
            .values()
            .filter(|p| p.invoice_reference() == Some(invoice.name.as_str()))
            .map(|p| p.id)
            .collect();
        for payment in payments {
            ids.extend(
                open_reconcilable(&self.entry_lines(EntryRef::Payment(payment)))
                    .into_iter()
                    .filter(|l| l.account == account)
                    .map(|l| l.id),
            );
        }
        if ids.len() < 2 {
            return Ok(None);
        }
        self.apply_reconcile(&ids).map(Some)
    }

    fn entry_lines(&self, entry: EntryRef) -> Vec<LedgerLine> {
        self.ledger_lines
            .values()
            .filter(|l| l.entry == entry)
            .cloned()
            .collect()
    }
}

/// Publish records the session changed or created since `base` was taken.
fn merge_changes<K, V>(shared: &mut BTreeMap<K, V>, base: &BTreeMap<K, V>, staged: &BTreeMap<K, V>)
where
    K: Ord + Copy,
    V: Clone + PartialEq,
{
    for (key, value) in staged {
        if base.get(key) != Some(value) {
            shared.insert(*key, value.clone());
        }
    }
}

fn sequence_year(date: Option<NaiveDate>) -> i32 {
    date.map(|d| d.year()).unwrap_or_else(|| Utc::now().year())
}

/// In-memory ERP store.
///
/// Intended for tests/dev. Sessions work on a snapshot taken when they open;
/// commit publishes the records the session touched (record-level last writer
/// wins). Individual operations can be made to fail with
/// [`InMemoryErpStore::fail_on`].
#[derive(Debug)]
pub struct InMemoryErpStore {
    name: StoreName,
    tables: RwLock<Tables>,
    failures: RwLock<HashMap<Operation, String>>,
    seq: Sequences,
    commits: AtomicU64,
}

impl InMemoryErpStore {
    pub fn new(name: StoreName) -> Self {
        Self {
            name,
            tables: RwLock::new(Tables::default()),
            failures: RwLock::new(HashMap::new()),
            seq: Sequences::default(),
            commits: AtomicU64::new(0),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn check(&self, operation: Operation) -> Result<(), StoreError> {
        let failures = self
            .failures
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        match failures.get(&operation) {
            Some(message) => Err(StoreError::Failed {
                operation,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Make every future `operation` fail with `message`.
    pub fn fail_on(&self, operation: Operation, message: impl Into<String>) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(operation, message.into());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.write() {
            failures.clear();
        }
    }

    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    // ---- seeding -------------------------------------------------------

    pub fn add_partition(&self, partition: PartitionId) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if !t.partitions.contains(&partition) {
            t.partitions.push(partition);
        }
        Ok(())
    }

    /// Seed a field of `model` (`account.move` lives in table `account_move`).
    pub fn define_field(&self, model: &str, field: &str) -> Result<(), StoreError> {
        self.write()?
            .columns
            .entry((table_of(model), field.to_string()))
            .or_insert(None);
        Ok(())
    }

    pub fn column_definition(&self, table: &str, column: &str) -> Option<String> {
        self.read()
            .ok()?
            .columns
            .get(&(table.to_string(), column.to_string()))
            .cloned()
            .flatten()
    }

    pub fn insert_customer(&self, customer: Customer) -> Result<CustomerId, StoreError> {
        let mut t = self.write()?;
        self.seq.reserve(customer.id.get());
        let id = customer.id;
        t.customers.insert(id, customer);
        Ok(id)
    }

    pub fn insert_tax(&self, tax: Tax) -> Result<TaxId, StoreError> {
        let mut t = self.write()?;
        self.seq.reserve(tax.id.get());
        let id = tax.id;
        t.taxes.insert(id, tax);
        Ok(id)
    }

    pub fn insert_journal(&self, journal: Journal) -> Result<JournalId, StoreError> {
        let mut t = self.write()?;
        self.seq.reserve(journal.id.get());
        let id = journal.id;
        t.journals.insert(id, journal);
        Ok(id)
    }

    pub fn insert_payment_method_line(&self, line: PaymentMethodLine) -> Result<PaymentMethodLineId, StoreError> {
        let mut t = self.write()?;
        self.seq.reserve(line.id.get());
        let id = line.id;
        t.method_lines.insert(id, line);
        Ok(id)
    }

    /// Insert an invoice; posted invoices get their ledger lines booked.
    pub fn insert_invoice(&self, invoice: Invoice) -> Result<InvoiceId, StoreError> {
        let mut t = self.write()?;
        self.seq.reserve(invoice.id.get());
        let id = invoice.id;
        if invoice.is_posted() {
            t.book_invoice(&self.seq, &invoice);
        }
        t.invoices.insert(id, invoice);
        Ok(id)
    }

    /// Insert a payment; posted payments get their ledger lines booked.
    pub fn insert_payment(&self, payment: Payment) -> Result<PaymentId, StoreError> {
        let mut t = self.write()?;
        self.seq.reserve(payment.id.get());
        let id = payment.id;
        if payment.is_posted() {
            t.book_payment(&self.seq, &payment);
        }
        t.payments.insert(id, payment);
        Ok(id)
    }

    /// Replace the ledger lines of an entry (for edge cases seeding cannot derive).
    pub fn replace_ledger_lines(&self, entry: EntryRef, lines: Vec<LedgerLine>) -> Result<(), StoreError> {
        let mut t = self.write()?;
        t.ledger_lines.retain(|_, l| l.entry != entry);
        for line in lines {
            self.seq.reserve(line.id.get());
            t.ledger_lines.insert(line.id, line);
        }
        Ok(())
    }

    // ---- inspection ----------------------------------------------------

    pub fn invoice(&self, id: InvoiceId) -> Option<Invoice> {
        self.read().ok()?.invoices.get(&id).cloned()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.read().map(|t| t.invoices.values().cloned().collect()).unwrap_or_default()
    }

    pub fn customers(&self) -> Vec<Customer> {
        self.read().map(|t| t.customers.values().cloned().collect()).unwrap_or_default()
    }

    pub fn payment(&self, id: PaymentId) -> Option<Payment> {
        self.read().ok()?.payments.get(&id).cloned()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.read().map(|t| t.payments.values().cloned().collect()).unwrap_or_default()
    }

    pub fn notes(&self, record: EntryRef) -> Vec<Note> {
        self.read()
            .map(|t| t.notes.iter().filter(|n| n.record == record).cloned().collect())
            .unwrap_or_default()
    }

    pub fn ledger_lines(&self, entry: EntryRef) -> Vec<LedgerLine> {
        self.read().map(|t| t.entry_lines(entry)).unwrap_or_default()
    }
}

impl ErpStore for InMemoryErpStore {
    fn name(&self) -> &StoreName {
        &self.name
    }

    fn partitions(&self) -> Result<Vec<PartitionId>, StoreError> {
        Ok(self.read()?.partitions.clone())
    }

    fn open_session(&self, ctx: SessionContext) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        self.check(Operation::OpenSession)?;
        if ctx.store() != &self.name {
            return Err(StoreError::Unavailable(ctx.store().clone()));
        }
        let base = self.read()?.clone();
        Ok(Box::new(InMemorySession {
            store: self,
            ctx,
            staged: base.clone(),
            base,
        }))
    }

    fn schema_catalog(&self) -> &dyn SchemaCatalog {
        self
    }
}

impl SchemaCatalog for InMemoryErpStore {
    fn column_exists(&self, table: &str, column: &str) -> Result<bool, SchemaError> {
        let tables = self.read().map_err(|e| SchemaError::Backend(e.to_string()))?;
        Ok(tables.columns.contains_key(&(table.to_string(), column.to_string())))
    }

    fn add_column(&self, spec: &ColumnSpec) -> Result<(), SchemaError> {
        validate_spec(spec)?;
        let mut tables = self.write().map_err(|e| SchemaError::Backend(e.to_string()))?;
        tables
            .columns
            .entry((spec.table.clone(), spec.column.clone()))
            .or_insert_with(|| Some(spec.definition.trim().to_string()));
        Ok(())
    }
}

/// Table backing `model`, following the ERP's dotted-name convention.
fn table_of(model: &str) -> String {
    model.replace('.', "_")
}

/// Name lookups match display names exactly.
fn named<E: Entity>(record: &E, name: &str) -> bool {
    record.display_name() == name
}

struct InMemorySession<'a> {
    store: &'a InMemoryErpStore,
    ctx: SessionContext,
    /// Snapshot taken when the session opened; commit publishes `staged - base`.
    base: Tables,
    staged: Tables,
}

impl InMemorySession<'_> {
    fn visible(&self, partition: Option<PartitionId>) -> bool {
        self.staged.visible(self.ctx.scope(), partition)
    }

    fn invoice_mut(&mut self, id: InvoiceId) -> Result<&mut Invoice, StoreError> {
        let scope = self.ctx.scope().clone();
        let visible = self
            .staged
            .invoices
            .get(&id)
            .map(|inv| self.staged.visible(&scope, inv.partition))
            .unwrap_or(false);
        if !visible {
            return Err(StoreError::not_found(format!("invoice {id}")));
        }
        self.staged
            .invoices
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("invoice {id}")))
    }

    fn payment_mut(&mut self, id: PaymentId) -> Result<&mut Payment, StoreError> {
        let scope = self.ctx.scope().clone();
        let visible = self
            .staged
            .payments
            .get(&id)
            .map(|p| self.staged.visible(&scope, p.partition))
            .unwrap_or(false);
        if !visible {
            return Err(StoreError::not_found(format!("payment {id}")));
        }
        self.staged
            .payments
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("payment {id}")))
    }
}

impl StoreSession for InMemorySession<'_> {
    fn context(&self) -> &SessionContext {
        &self.ctx
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .staged
            .invoices
            .get(&id)
            .filter(|inv| self.visible(inv.partition))
            .cloned())
    }

    fn find_invoices_by_name(&self, name: &str) -> Result<Vec<Invoice>, StoreError> {
        Ok(self
            .staged
            .invoices
            .values()
            .filter(|inv| named(*inv, name) && self.visible(inv.partition))
            .cloned()
            .collect())
    }

    fn find_invoice_by_origin(&self, source: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .staged
            .invoices
            .values()
            .find(|inv| inv.original_invoice_id == Some(source) && self.visible(inv.partition))
            .cloned())
    }

    fn set_invoice_journal(&mut self, id: InvoiceId, journal: JournalId) -> Result<(), StoreError> {
        self.store.check(Operation::SetInvoiceJournal)?;
        let invoice = self.invoice_mut(id)?;
        invoice
            .assign_journal(journal)
            .map_err(|e| StoreError::rejected(Operation::SetInvoiceJournal, e))
    }

    fn post_invoice(&mut self, id: InvoiceId) -> Result<(), StoreError> {
        self.store.check(Operation::PostInvoice)?;
        let mut invoice = self.invoice_mut(id)?.clone();
        let prefix = match invoice.move_type {
            MoveType::InInvoice | MoveType::InRefund => "BILL",
            MoveType::OutRefund => "RINV",
            MoveType::OutInvoice | MoveType::Entry => "INV",
        };
        let seq = self.store.seq.next_invoice();
        let name = format!("{prefix}/{}/{seq:04}", sequence_year(invoice.invoice_date));
        invoice
            .post(name)
            .map_err(|e| StoreError::rejected(Operation::PostInvoice, e))?;
        self.staged.book_invoice(&self.store.seq, &invoice);
        self.staged.invoices.insert(id, invoice);
        Ok(())
    }

    fn create_invoice(&mut self, values: NewInvoice) -> Result<InvoiceId, StoreError> {
        self.store.check(Operation::CreateInvoice)?;
        if !self.staged.customers.contains_key(&values.customer) {
            return Err(StoreError::rejected(
                Operation::CreateInvoice,
                DomainError::invariant(format!("unknown customer {}", values.customer)),
            ));
        }
        if !self.staged.journals.contains_key(&values.journal) {
            return Err(StoreError::rejected(
                Operation::CreateInvoice,
                DomainError::invariant(format!("unknown journal {}", values.journal)),
            ));
        }
        let id = InvoiceId::new(self.store.seq.next_id());
        let partition = self.staged.active_partition(self.ctx.scope());
        self.staged.invoices.insert(
            id,
            Invoice {
                id,
                name: DRAFT_NAME.to_string(),
                move_type: values.move_type,
                state: InvoiceState::Draft,
                payment_state: PaymentState::NotPaid,
                customer: values.customer,
                journal: Some(values.journal),
                invoice_date: values.invoice_date,
                due_date: values.due_date,
                payment_reference: values.payment_reference,
                lines: values.lines,
                original_invoice_id: values.original_invoice_id,
                synced: false,
                partition,
            },
        );
        Ok(id)
    }

    fn mark_invoice_synced(&mut self, id: InvoiceId) -> Result<(), StoreError> {
        self.store.check(Operation::MarkInvoiceSynced)?;
        self.invoice_mut(id)?.synced = true;
        Ok(())
    }

    fn set_invoice_payment_state(&mut self, id: InvoiceId, state: PaymentState) -> Result<(), StoreError> {
        self.store.check(Operation::SetPaymentState)?;
        self.invoice_mut(id)?.payment_state = state;
        Ok(())
    }

    fn customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .staged
            .customers
            .get(&id)
            .filter(|c| self.visible(c.partition))
            .cloned())
    }

    fn find_customer_by_name(&self, name: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .staged
            .customers
            .values()
            .find(|c| named(*c, name) && self.visible(c.partition))
            .cloned())
    }

    fn create_customer(&mut self, draft: CustomerDraft) -> Result<CustomerId, StoreError> {
        self.store.check(Operation::CreateCustomer)?;
        draft
            .validate()
            .map_err(|e| StoreError::rejected(Operation::CreateCustomer, e))?;
        let id = CustomerId::new(self.store.seq.next_id());
        self.staged.customers.insert(
            id,
            Customer {
                id,
                name: draft.name,
                contact: draft.contact,
                customer_rank: draft.customer_rank,
                partition: None,
            },
        );
        Ok(id)
    }

    fn tax(&self, id: TaxId) -> Result<Option<Tax>, StoreError> {
        Ok(self
            .staged
            .taxes
            .get(&id)
            .filter(|t| self.visible(t.partition))
            .cloned())
    }

    fn find_tax_by_name(&self, name: &str) -> Result<Option<Tax>, StoreError> {
        Ok(self
            .staged
            .taxes
            .values()
            .find(|t| named(*t, name) && self.visible(t.partition))
            .cloned())
    }

    fn sale_journals(&self) -> Result<Vec<Journal>, StoreError> {
        Ok(self
            .staged
            .journals
            .values()
            .filter(|j| j.is_sale() && self.visible(j.partition))
            .cloned()
            .collect())
    }

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .staged
            .payments
            .get(&id)
            .filter(|p| self.visible(p.partition))
            .cloned())
    }

    fn payment_method_line(&self, id: PaymentMethodLineId) -> Result<Option<PaymentMethodLine>, StoreError> {
        Ok(self.staged.method_lines.get(&id).cloned())
    }

    fn find_payment_method_line_by_name(&self, name: &str) -> Result<Option<PaymentMethodLine>, StoreError> {
        Ok(self
            .staged
            .method_lines
            .values()
            .find(|m| named(*m, name))
            .cloned())
    }

    fn first_payment_method_line(&self) -> Result<Option<PaymentMethodLine>, StoreError> {
        Ok(self.staged.method_lines.values().next().cloned())
    }

    fn register_payment(&mut self, registration: PaymentRegistration) -> Result<PaymentId, StoreError> {
        self.store.check(Operation::RegisterPayment)?;
        registration
            .validate()
            .map_err(|e| StoreError::rejected(Operation::RegisterPayment, e))?;

        let invoice = self.invoice_mut(registration.invoice)?.clone();
        if !invoice.is_posted() {
            return Err(StoreError::rejected(
                Operation::RegisterPayment,
                DomainError::invariant(format!("invoice {} is not posted", invoice.name)),
            ));
        }
        if !self.staged.journals.contains_key(&registration.journal) {
            return Err(StoreError::not_found(format!("journal {}", registration.journal)));
        }
        if !self.staged.method_lines.contains_key(&registration.payment_method_line) {
            return Err(StoreError::not_found(format!(
                "payment method line {}",
                registration.payment_method_line
            )));
        }

        let seq = self.store.seq.next_payment();
        let id = PaymentId::new(self.store.seq.next_id());
        let payment = Payment {
            id,
            name: format!("PAY/{}/{seq:04}", registration.payment_date.year()),
            amount: registration.amount,
            date: registration.payment_date,
            payment_method_line: Some(registration.payment_method_line),
            payment_type: registration.payment_type,
            partner_type: registration.partner_type,
            partner: registration.partner,
            currency: registration.currency,
            reference: Some(invoice.name.clone()),
            state: PaymentStatus::Posted,
            synced: false,
            sent: false,
            partition: self.staged.active_partition(self.ctx.scope()),
        };
        self.staged.book_payment(&self.store.seq, &payment);
        self.staged.payments.insert(id, payment);

        self.staged
            .settle_invoice(&invoice)
            .map_err(|e| StoreError::rejected(Operation::RegisterPayment, e))?;

        Ok(id)
    }

    fn mark_payment_synced(&mut self, id: PaymentId) -> Result<(), StoreError> {
        self.store.check(Operation::MarkPaymentSynced)?;
        self.payment_mut(id)?.synced = true;
        Ok(())
    }

    fn mark_payment_sent(&mut self, id: PaymentId) -> Result<(), StoreError> {
        self.store.check(Operation::MarkPaymentSent)?;
        self.payment_mut(id)?.sent = true;
        Ok(())
    }

    fn ledger_lines(&self, entry: EntryRef) -> Result<Vec<LedgerLine>, StoreError> {
        Ok(self.staged.entry_lines(entry))
    }

    fn reconcile(&mut self, lines: &[LedgerLineId]) -> Result<ReconcileOutcome, StoreError> {
        self.store.check(Operation::Reconcile)?;
        self.staged
            .apply_reconcile(lines)
            .map_err(|e| StoreError::rejected(Operation::Reconcile, e))
    }

    fn post_note(&mut self, record: EntryRef, body: &str) -> Result<(), StoreError> {
        self.store.check(Operation::PostNote)?;
        let exists = match record {
            EntryRef::Invoice(id) => self.invoice(id)?.is_some(),
            EntryRef::Payment(id) => self.payment(id)?.is_some(),
        };
        if !exists {
            return Err(StoreError::not_found(format!("{record:?}")));
        }
        self.staged.notes.push(Note {
            record,
            author: self.ctx.user(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn has_field(&self, model: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self
            .staged
            .columns
            .contains_key(&(table_of(model), field.to_string())))
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.store.check(Operation::Commit)?;
        let mut tables = self.store.write()?;
        merge_changes(&mut tables.invoices, &self.base.invoices, &self.staged.invoices);
        merge_changes(&mut tables.customers, &self.base.customers, &self.staged.customers);
        merge_changes(&mut tables.payments, &self.base.payments, &self.staged.payments);
        merge_changes(&mut tables.ledger_lines, &self.base.ledger_lines, &self.staged.ledger_lines);
        tables
            .notes
            .extend(self.staged.notes[self.base.notes.len()..].iter().cloned());
        drop(tables);
        self.base = self.staged.clone();
        self.store.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbridge_accounting::JournalKind;
    use ledgerbridge_core::{CurrencyId, UserId};
    use ledgerbridge_invoicing::ContentLine;
    use ledgerbridge_parties::ContactInfo;

    fn store() -> InMemoryErpStore {
        let store = InMemoryErpStore::new(StoreName::new("TEST").unwrap());
        store.add_partition(PartitionId::new(1)).unwrap();
        store.add_partition(PartitionId::new(2)).unwrap();
        store
    }

    fn ctx(store: &InMemoryErpStore) -> SessionContext {
        SessionContext::new(store.name().clone(), UserId::new(2))
    }

    fn customer(id: u64, name: &str, partition: Option<u64>) -> Customer {
        Customer {
            id: CustomerId::new(id),
            name: name.to_string(),
            contact: ContactInfo::default(),
            customer_rank: 1,
            partition: partition.map(PartitionId::new),
        }
    }

    fn sale_journal(id: u64) -> Journal {
        Journal {
            id: JournalId::new(id),
            name: "Customer Invoices".to_string(),
            kind: JournalKind::Sale,
            default_account: Some(DEFAULT_INCOME_ACCOUNT),
            partition: None,
        }
    }

    fn new_invoice(customer: CustomerId, journal: JournalId) -> NewInvoice {
        NewInvoice {
            customer,
            move_type: MoveType::OutInvoice,
            journal,
            invoice_date: NaiveDate::from_ymd_opt(2024, 5, 2),
            due_date: None,
            payment_reference: None,
            lines: vec![LineItem::Content(ContentLine {
                sequence: 10,
                name: "Widget".to_string(),
                quantity: 2.0,
                price_unit: 10.0,
                discount: 0.0,
                tax_ids: vec![],
                account: Some(DEFAULT_INCOME_ACCOUNT),
            })],
            original_invoice_id: None,
        }
    }

    #[test]
    fn uncommitted_writes_are_discarded() {
        let store = store();
        store.insert_customer(customer(5, "Acme", None)).unwrap();
        {
            let mut session = store.open_session(ctx(&store)).unwrap();
            session.create_customer(CustomerDraft::copy_of(&customer(0, "Other", None))).unwrap();
        }
        assert_eq!(store.customers().len(), 1);
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn default_scope_hides_other_partitions() {
        let store = store();
        store.insert_customer(customer(5, "Acme", Some(2))).unwrap();
        let session = store.open_session(ctx(&store)).unwrap();
        assert!(session.find_customer_by_name("Acme").unwrap().is_none());

        let wide = ctx(&store)
            .with_all_partitions(&store.partitions().unwrap())
            .unwrap();
        let session = store.open_session(wide).unwrap();
        assert!(session.find_customer_by_name("Acme").unwrap().is_some());
    }

    #[test]
    fn posting_books_lines_and_registering_payment_settles_invoice() {
        let store = store();
        let cust = store.insert_customer(customer(5, "Acme", None)).unwrap();
        let journal = store.insert_journal(sale_journal(14)).unwrap();
        store
            .insert_payment_method_line(PaymentMethodLine {
                id: PaymentMethodLineId::new(3),
                name: "Manual Payment".to_string(),
                code: "manual".to_string(),
                journal: Some(journal),
            })
            .unwrap();

        let mut session = store.open_session(ctx(&store)).unwrap();
        let id = session.create_invoice(new_invoice(cust, journal)).unwrap();
        session.post_invoice(id).unwrap();
        let posted = session.invoice(id).unwrap().unwrap();
        assert_eq!(posted.name, "INV/2024/0001");

        session
            .register_payment(PaymentRegistration {
                invoice: id,
                amount: 20.0,
                payment_date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
                journal,
                payment_method_line: PaymentMethodLineId::new(3),
                payment_type: PaymentType::Inbound,
                partner_type: PartnerType::Customer,
                partner: cust,
                currency: CurrencyId::new(1),
            })
            .unwrap();
        session.commit().unwrap();

        let invoice = store.invoice(id).unwrap();
        assert_eq!(invoice.payment_state, PaymentState::Paid);
        assert!(open_reconcilable(&store.ledger_lines(EntryRef::Invoice(id))).is_empty());
    }

    #[test]
    fn injected_failures_surface_as_failed() {
        let store = store();
        store.fail_on(Operation::CreateCustomer, "database is read-only");
        let mut session = store.open_session(ctx(&store)).unwrap();
        let err = session
            .create_customer(CustomerDraft::copy_of(&customer(0, "Acme", None)))
            .unwrap_err();
        assert!(matches!(err, StoreError::Failed { operation: Operation::CreateCustomer, .. }));
    }

    #[test]
    fn session_for_another_store_is_refused() {
        let store = store();
        let foreign = SessionContext::new(StoreName::new("ELSEWHERE").unwrap(), UserId::new(2));
        assert!(matches!(store.open_session(foreign), Err(StoreError::Unavailable(_))));
    }
}
