mod common;

use std::sync::Arc;

use common::*;
use ledgerbridge_accounting::EntryRef;
use ledgerbridge_core::{PaymentId, PaymentMethodLineId, StoreName};
use ledgerbridge_infra::{InMemoryErpStore, Operation};
use ledgerbridge_invoicing::{InvoiceState, PaymentState, PaymentStatus};
use ledgerbridge_sync::{SyncError, SyncErrorKind};

/// Replicate and post the source invoice, then seed a payment referencing it.
fn synced_invoice(h: &Harness, amount: f64, method: u64) -> String {
    let target_invoice = h.service.replicate_invoice(USER, SOURCE_INVOICE).unwrap();
    let name = h.post_in_target(target_invoice);
    h.primary
        .insert_payment(payment(SOURCE_PAYMENT.get(), &name, amount, method))
        .unwrap();
    name
}

#[test]
fn payment_is_registered_against_the_replicated_invoice() {
    let h = Harness::new();
    let name = synced_invoice(&h, 24.6, 31);

    let target_payment = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap();

    let registered = h.target.payment(target_payment).unwrap();
    assert_eq!(registered.state, PaymentStatus::Posted);
    assert_eq!(registered.amount, 24.6);
    assert_eq!(registered.date, date(10));
    assert_eq!(registered.reference.as_deref(), Some(name.as_str()));
    assert_eq!(registered.payment_method_line, Some(PaymentMethodLineId::new(71)));
    assert_eq!(registered.partner, h.target.customers()[0].id);

    let invoice = h.target.invoices().into_iter().find(|i| i.name == name).unwrap();
    assert_eq!(invoice.payment_state, PaymentState::Paid);

    let source = h.primary.payment(SOURCE_PAYMENT).unwrap();
    assert!(source.synced);
    let notes = h.primary.notes(EntryRef::Payment(SOURCE_PAYMENT));
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].body, "Payment successfully synced.");
}

#[test]
fn partial_payment_leaves_the_invoice_partially_paid() {
    let h = Harness::new();
    let name = synced_invoice(&h, 10.0, 31);
    h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap();

    let invoice = h.target.invoices().into_iter().find(|i| i.name == name).unwrap();
    assert_eq!(invoice.payment_state, PaymentState::Partial);
}

#[test]
fn unknown_reference_fails_with_invoice_not_found_but_keeps_the_customer() {
    let h = Harness::new();
    h.primary
        .insert_payment(payment(SOURCE_PAYMENT.get(), "INV/2024/0007", 20.0, 31))
        .unwrap();

    let err = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap_err();
    assert_eq!(err, SyncError::InvoiceNotFound("INV/2024/0007".to_string()));
    assert_eq!(h.target.customers().len(), 1);
    assert!(h.target.payments().is_empty());
    assert!(!h.primary.payment(SOURCE_PAYMENT).unwrap().synced);
}

#[test]
fn padded_reference_does_not_match_the_invoice_name() {
    let h = Harness::new();
    let target_invoice = h.service.replicate_invoice(USER, SOURCE_INVOICE).unwrap();
    let name = h.post_in_target(target_invoice);
    let padded = format!("  {name}  ");
    h.primary
        .insert_payment(payment(SOURCE_PAYMENT.get(), &padded, 24.6, 31))
        .unwrap();

    let err = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap_err();
    assert_eq!(err, SyncError::InvoiceNotFound(padded));
    assert!(h.target.payments().is_empty());
    assert!(!h.primary.payment(SOURCE_PAYMENT).unwrap().synced);
}

#[test]
fn draft_invoice_with_matching_name_fails_with_invoice_not_posted() {
    let target = target_store();
    target
        .insert_invoice(invoice(80, "INV/2024/0007", InvoiceState::Draft, vec![widget(1, &[])]))
        .unwrap();
    let h = Harness::with_stores(primary_store(), target);
    h.primary
        .insert_payment(payment(SOURCE_PAYMENT.get(), "INV/2024/0007", 20.0, 31))
        .unwrap();

    let err = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap_err();
    assert_eq!(err, SyncError::InvoiceNotPosted("INV/2024/0007".to_string()));
    let user_facing = h.service.sync_payment(USER, SOURCE_PAYMENT).unwrap_err();
    assert_eq!(user_facing.kind, SyncErrorKind::InvoiceNotPosted);
}

#[test]
fn unknown_payment_method_falls_back_to_an_available_one() {
    let h = Harness::new();
    synced_invoice(&h, 24.6, 32);

    let target_payment = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap();
    assert_eq!(
        h.target.payment(target_payment).unwrap().payment_method_line,
        Some(PaymentMethodLineId::new(71))
    );
}

#[test]
fn target_without_payment_methods_fails_with_no_payment_method() {
    let target = Arc::new(InMemoryErpStore::new(StoreName::new("PICCOLO_COMMUNITY").unwrap()));
    target.add_partition(ledgerbridge_core::PartitionId::new(1)).unwrap();
    target
        .insert_journal(journal(3, "Customer Invoices", ledgerbridge_accounting::JournalKind::Sale, Some(INCOME)))
        .unwrap();
    let h = Harness::with_stores(primary_store(), target);
    synced_invoice(&h, 24.6, 31);

    let err = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap_err();
    assert_eq!(err, SyncError::NoPaymentMethod);
}

#[test]
fn payment_without_reference_is_rejected() {
    let h = Harness::new();
    h.primary
        .insert_payment(payment(SOURCE_PAYMENT.get(), "  ", 20.0, 31))
        .unwrap();

    let err = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::PaymentSyncFailed);
    assert_eq!(h.target.commit_count(), 0);
}

#[test]
fn registration_failure_is_a_payment_sync_failure() {
    let h = Harness::new();
    synced_invoice(&h, 24.6, 31);
    h.target.fail_on(Operation::RegisterPayment, "wizard crashed");

    let err = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::PaymentSyncFailed);
    assert!(err.to_string().contains("wizard crashed"));
}

#[test]
fn repeated_payment_sync_registers_once() {
    let h = Harness::new();
    synced_invoice(&h, 24.6, 31);

    let first = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap();
    let second = h.service.replicate_payment(USER, SOURCE_PAYMENT).unwrap();
    assert_eq!(first, second);
    assert_eq!(h.target.payments().len(), 1);
}

#[test]
fn missing_source_payment_is_not_found() {
    let h = Harness::new();
    let err = h.service.replicate_payment(USER, PaymentId::new(999)).unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}
