//! Two in-memory stores seeded like a primary/community pair.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;

use ledgerbridge_accounting::{Journal, JournalKind, Tax};
use ledgerbridge_core::{
    AccountId, CountryId, CurrencyId, CustomerId, InvoiceId, JournalId, PartitionId, PaymentId,
    PaymentMethodLineId, StoreName, TaxId, UserId,
};
use ledgerbridge_infra::{
    ErpStore, InMemoryErpStore, InMemorySagaLog, SagaLog, SessionContext, SyncConfig,
};
use ledgerbridge_invoicing::{
    ContentLine, Invoice, InvoiceState, LineItem, MoveType, PartnerType, Payment, PaymentMethodLine,
    PaymentState, PaymentStatus, PaymentType,
};
use ledgerbridge_parties::{ContactInfo, Customer};
use ledgerbridge_sync::{SyncService, TargetCapabilities};

pub const USER: UserId = UserId::new(2);
pub const ACME: CustomerId = CustomerId::new(5);
pub const SOURCE_INVOICE: InvoiceId = InvoiceId::new(100);
pub const SOURCE_PAYMENT: PaymentId = PaymentId::new(200);
pub const INCOME: AccountId = AccountId::new(7000);
pub const TARGET_SALE_JOURNAL: JournalId = JournalId::new(3);
pub const TARGET_VAT: TaxId = TaxId::new(61);

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

pub fn acme() -> Customer {
    Customer {
        id: ACME,
        name: "Acme Lda".to_string(),
        contact: ContactInfo {
            email: Some("billing@acme.test".to_string()),
            phone: Some("+351 210 000 000".to_string()),
            street: Some("Rua Augusta 1".to_string()),
            city: Some("Lisboa".to_string()),
            zip: Some("1100-048".to_string()),
            country_id: Some(CountryId::new(185)),
            vat: Some("PT500000000".to_string()),
        },
        customer_rank: 3,
        partition: None,
    }
}

pub fn journal(id: u64, name: &str, kind: JournalKind, default_account: Option<AccountId>) -> Journal {
    Journal {
        id: JournalId::new(id),
        name: name.to_string(),
        kind,
        default_account,
        partition: None,
    }
}

pub fn tax(id: u64, name: &str, rate: f64, partition: Option<u64>) -> Tax {
    Tax {
        id: TaxId::new(id),
        name: name.to_string(),
        rate,
        partition: partition.map(PartitionId::new),
    }
}

pub fn method(id: u64, name: &str, code: &str) -> PaymentMethodLine {
    PaymentMethodLine {
        id: PaymentMethodLineId::new(id),
        name: name.to_string(),
        code: code.to_string(),
        journal: None,
    }
}

pub fn widget(sequence: i32, taxes: &[u64]) -> LineItem {
    LineItem::Content(ContentLine {
        sequence,
        name: "Widget".to_string(),
        quantity: 2.0,
        price_unit: 10.0,
        discount: 0.0,
        tax_ids: taxes.iter().copied().map(TaxId::new).collect(),
        account: Some(INCOME),
    })
}

pub fn invoice(id: u64, name: &str, state: InvoiceState, lines: Vec<LineItem>) -> Invoice {
    Invoice {
        id: InvoiceId::new(id),
        name: name.to_string(),
        move_type: MoveType::OutInvoice,
        state,
        payment_state: PaymentState::NotPaid,
        customer: ACME,
        journal: Some(JournalId::new(51)),
        invoice_date: Some(date(2)),
        due_date: Some(date(30)),
        payment_reference: Some(name.to_string()),
        lines,
        original_invoice_id: None,
        synced: false,
        partition: Some(PartitionId::new(1)),
    }
}

pub fn payment(id: u64, reference: &str, amount: f64, method: u64) -> Payment {
    Payment {
        id: PaymentId::new(id),
        name: format!("PBNK1/2024/{id:04}"),
        amount,
        date: date(10),
        payment_method_line: Some(PaymentMethodLineId::new(method)),
        payment_type: PaymentType::Inbound,
        partner_type: PartnerType::Customer,
        partner: ACME,
        currency: CurrencyId::new(1),
        reference: Some(reference.to_string()),
        state: PaymentStatus::Posted,
        synced: false,
        sent: false,
        partition: Some(PartitionId::new(1)),
    }
}

/// Primary store with a draft invoice (Widget ×2 @ 10 + "Extras" section) for Acme.
pub fn primary_store() -> Arc<InMemoryErpStore> {
    let store = InMemoryErpStore::new(StoreName::new("PICCOLO").unwrap());
    store.add_partition(PartitionId::new(1)).unwrap();
    store.insert_customer(acme()).unwrap();
    store.insert_tax(tax(21, "VAT 23%", 23.0, None)).unwrap();
    store.insert_tax(tax(22, "Eco fee", 1.0, None)).unwrap();
    store
        .insert_journal(journal(50, "Invoices (sync)", JournalKind::Sale, Some(INCOME)))
        .unwrap();
    store
        .insert_journal(journal(51, "Invoices", JournalKind::Sale, Some(INCOME)))
        .unwrap();
    store.insert_payment_method_line(method(31, "Manual Payment", "manual")).unwrap();
    store.insert_payment_method_line(method(32, "SEPA", "sepa")).unwrap();
    store
        .insert_invoice(invoice(
            SOURCE_INVOICE.get(),
            "/",
            InvoiceState::Draft,
            vec![widget(10, &[21, 22]), LineItem::section(20, "Extras")],
        ))
        .unwrap();
    Arc::new(store)
}

/// Target store spread over two partitions; its VAT tax lives in the second one.
pub fn target_store() -> Arc<InMemoryErpStore> {
    let store = InMemoryErpStore::new(StoreName::new("PICCOLO_COMMUNITY").unwrap());
    store.add_partition(PartitionId::new(1)).unwrap();
    store.add_partition(PartitionId::new(2)).unwrap();
    store.define_field("account.move", "original_invoice_id").unwrap();
    store.insert_tax(tax(TARGET_VAT.get(), "VAT 23%", 23.0, Some(2))).unwrap();
    store
        .insert_journal(journal(TARGET_SALE_JOURNAL.get(), "Customer Invoices", JournalKind::Sale, Some(INCOME)))
        .unwrap();
    store.insert_journal(journal(14, "Bank", JournalKind::Bank, None)).unwrap();
    store.insert_payment_method_line(method(71, "Manual Payment", "manual")).unwrap();
    Arc::new(store)
}

pub struct Harness {
    pub primary: Arc<InMemoryErpStore>,
    pub target: Arc<InMemoryErpStore>,
    pub saga: Arc<InMemorySagaLog>,
    pub service: SyncService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_stores(primary_store(), target_store())
    }

    pub fn with_stores(primary: Arc<InMemoryErpStore>, target: Arc<InMemoryErpStore>) -> Self {
        Self::with_saga(primary, target, Arc::new(InMemorySagaLog::new()))
    }

    pub fn with_saga(
        primary: Arc<InMemoryErpStore>,
        target: Arc<InMemoryErpStore>,
        saga: Arc<InMemorySagaLog>,
    ) -> Self {
        let capabilities = TargetCapabilities::probe(
            &*target,
            SessionContext::new(target.name().clone(), USER),
        )
        .unwrap();
        let service = SyncService::new(
            primary.clone() as Arc<dyn ErpStore>,
            target.clone() as Arc<dyn ErpStore>,
            saga.clone() as Arc<dyn SagaLog>,
            capabilities,
            &SyncConfig::default(),
        );
        Self {
            primary,
            target,
            saga,
            service,
        }
    }

    /// Post a target invoice the way a target-store user would.
    pub fn post_in_target(&self, id: InvoiceId) -> String {
        let ctx = SessionContext::new(self.target.name().clone(), USER)
            .with_all_partitions(&self.target.partitions().unwrap())
            .unwrap();
        let mut session = self.target.open_session(ctx).unwrap();
        session.post_invoice(id).unwrap();
        session.commit().unwrap();
        self.target.invoice(id).unwrap().name
    }
}
