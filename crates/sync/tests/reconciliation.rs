mod common;

use common::*;
use ledgerbridge_accounting::{EntryRef, open_reconcilable};
use ledgerbridge_core::{InvoiceId, PaymentId};
use ledgerbridge_infra::Operation;
use ledgerbridge_invoicing::{InvoiceState, PartnerType, PaymentState, PaymentStatus};
use ledgerbridge_sync::{SentOutcome, SkipReason};

const POSTED: InvoiceId = InvoiceId::new(300);
const POSTED_NAME: &str = "INV/2024/0300";

fn harness() -> Harness {
    let h = Harness::new();
    h.primary
        .insert_invoice(invoice(POSTED.get(), POSTED_NAME, InvoiceState::Posted, vec![widget(1, &[])]))
        .unwrap();
    h
}

#[test]
fn manual_payment_is_reconciled_and_marked_sent() {
    let h = harness();
    h.primary.insert_payment(payment(400, POSTED_NAME, 20.0, 31)).unwrap();

    let outcomes = h.service.mark_payments_sent(USER, &[PaymentId::new(400)]);
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].sent);
    assert_eq!(outcomes[0].outcome, SentOutcome::Reconciled { invoice: POSTED });

    assert!(h.primary.payment(PaymentId::new(400)).unwrap().sent);
    assert_eq!(h.primary.invoice(POSTED).unwrap().payment_state, PaymentState::Paid);
    assert!(open_reconcilable(&h.primary.ledger_lines(EntryRef::Invoice(POSTED))).is_empty());
}

#[test]
fn reconciliation_failure_does_not_stop_the_batch() {
    let h = harness();
    let mut supplier = payment(401, POSTED_NAME, 20.0, 31);
    supplier.partner_type = PartnerType::Supplier;
    h.primary.insert_payment(supplier).unwrap();
    h.primary.insert_payment(payment(400, POSTED_NAME, 20.0, 31)).unwrap();

    let outcomes = h
        .service
        .mark_payments_sent(USER, &[PaymentId::new(401), PaymentId::new(400)]);

    assert!(matches!(outcomes[0].outcome, SentOutcome::ReconciliationFailed { invoice, .. } if invoice == POSTED));
    assert!(outcomes[0].sent);
    assert!(h.primary.payment(PaymentId::new(401)).unwrap().sent);

    assert_eq!(outcomes[1].outcome, SentOutcome::Reconciled { invoice: POSTED });
    assert!(h.primary.payment(PaymentId::new(400)).unwrap().sent);
}

#[test]
fn store_refusing_reconciliation_still_marks_the_payment_sent() {
    let h = harness();
    h.primary.insert_payment(payment(400, POSTED_NAME, 20.0, 31)).unwrap();
    h.primary.fail_on(Operation::Reconcile, "lines locked");

    let outcomes = h.service.mark_payments_sent(USER, &[PaymentId::new(400)]);
    match &outcomes[0].outcome {
        SentOutcome::ReconciliationFailed { reason, .. } => assert!(reason.contains("lines locked")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(h.primary.payment(PaymentId::new(400)).unwrap().sent);
    assert_eq!(h.primary.invoice(POSTED).unwrap().payment_state, PaymentState::NotPaid);
}

#[test]
fn invoice_without_open_lines_is_forced_to_paid() {
    let h = harness();
    h.primary.replace_ledger_lines(EntryRef::Invoice(POSTED), Vec::new()).unwrap();
    h.primary.insert_payment(payment(402, POSTED_NAME, 20.0, 31)).unwrap();

    let outcomes = h.service.mark_payments_sent(USER, &[PaymentId::new(402)]);
    assert_eq!(outcomes[0].outcome, SentOutcome::ForcedPaid { invoice: POSTED });
    assert_eq!(h.primary.invoice(POSTED).unwrap().payment_state, PaymentState::Paid);
    assert!(h.primary.payment(PaymentId::new(402)).unwrap().sent);
}

#[test]
fn payment_without_open_lines_is_only_marked_sent() {
    let h = harness();
    h.primary.insert_payment(payment(403, POSTED_NAME, 20.0, 31)).unwrap();
    h.primary
        .replace_ledger_lines(EntryRef::Payment(PaymentId::new(403)), Vec::new())
        .unwrap();

    let outcomes = h.service.mark_payments_sent(USER, &[PaymentId::new(403)]);
    assert_eq!(outcomes[0].outcome, SentOutcome::NothingToReconcile { invoice: POSTED });
    assert!(outcomes[0].sent);
    assert_eq!(h.primary.invoice(POSTED).unwrap().payment_state, PaymentState::NotPaid);
}

#[test]
fn ineligible_payments_are_skipped_and_left_unsent() {
    let h = harness();
    h.primary
        .insert_invoice(invoice(302, "INV/2024/0302", InvoiceState::Draft, vec![widget(1, &[])]))
        .unwrap();

    let mut draft = payment(404, POSTED_NAME, 20.0, 31);
    draft.state = PaymentStatus::Draft;
    let mut already_sent = payment(405, POSTED_NAME, 20.0, 31);
    already_sent.sent = true;
    for p in [
        draft,
        already_sent,
        payment(406, POSTED_NAME, 20.0, 32),
        payment(407, "NOPE", 20.0, 31),
        payment(408, "INV/2024/0302", 20.0, 31),
    ] {
        h.primary.insert_payment(p).unwrap();
    }

    let ids: Vec<PaymentId> = [404, 405, 406, 407, 408, 999].into_iter().map(PaymentId::new).collect();
    let outcomes = h.service.mark_payments_sent(USER, &ids);

    let reasons: Vec<SentOutcome> = outcomes.iter().map(|o| o.outcome.clone()).collect();
    let skipped = |reason| SentOutcome::Skipped { reason };
    assert_eq!(
        reasons,
        vec![
            skipped(SkipReason::NotPosted),
            skipped(SkipReason::AlreadySent),
            skipped(SkipReason::NotManual),
            skipped(SkipReason::NoMatchingInvoice),
            skipped(SkipReason::NoMatchingInvoice),
            skipped(SkipReason::NotFound),
        ]
    );
    assert!(outcomes.iter().all(|o| !o.sent));
    assert!(!h.primary.payment(PaymentId::new(406)).unwrap().sent);
}

#[test]
fn padded_reference_finds_no_invoice() {
    let h = harness();
    h.primary.insert_payment(payment(409, " INV/2024/0300", 20.0, 31)).unwrap();

    let outcomes = h.service.mark_payments_sent(USER, &[PaymentId::new(409)]);
    assert_eq!(
        outcomes[0].outcome,
        SentOutcome::Skipped {
            reason: SkipReason::NoMatchingInvoice
        }
    );
    assert!(!h.primary.payment(PaymentId::new(409)).unwrap().sent);
    assert_eq!(h.primary.invoice(POSTED).unwrap().payment_state, PaymentState::NotPaid);
}

#[test]
fn store_failure_is_reported_per_payment() {
    let h = harness();
    h.primary.insert_payment(payment(400, POSTED_NAME, 20.0, 31)).unwrap();
    h.primary.fail_on(Operation::MarkPaymentSent, "read-only replica");

    let outcomes = h.service.mark_payments_sent(USER, &[PaymentId::new(400)]);
    assert!(!outcomes[0].sent);
    assert!(matches!(&outcomes[0].outcome, SentOutcome::Failed { reason } if reason.contains("read-only replica")));
    assert!(!h.primary.payment(PaymentId::new(400)).unwrap().sent);
}
