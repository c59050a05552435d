use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ledgerbridge_core::{
    AccountId, CustomerId, DomainError, Entity, InvoiceId, JournalId, PartitionId, TaxId,
};

/// Journal entry type. Only invoices and refunds take part in replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    /// Customer invoice.
    OutInvoice,
    /// Vendor bill.
    InInvoice,
    OutRefund,
    InRefund,
    Entry,
}

impl MoveType {
    /// Customer invoice or vendor bill.
    pub fn is_invoice(self) -> bool {
        matches!(self, MoveType::OutInvoice | MoveType::InInvoice)
    }
}

/// Invoice lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Draft,
    Posted,
    Cancel,
}

/// Settlement status of a posted invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    NotPaid,
    Partial,
    InPayment,
    Paid,
}

/// Priced invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentLine {
    pub sequence: i32,
    pub name: String,
    pub quantity: f64,
    pub price_unit: f64,
    /// Discount percentage (`10.0` = 10 %).
    pub discount: f64,
    pub tax_ids: Vec<TaxId>,
    pub account: Option<AccountId>,
}

impl ContentLine {
    /// Amount before tax, after discount.
    pub fn subtotal(&self) -> f64 {
        self.quantity * self.price_unit * (1.0 - self.discount / 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralKind {
    Section,
    Note,
}

/// Section heading or free note: carries only a name and a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralLine {
    pub kind: StructuralKind,
    pub sequence: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "display_type", rename_all = "snake_case")]
pub enum LineItem {
    Content(ContentLine),
    Structural(StructuralLine),
}

impl LineItem {
    pub fn sequence(&self) -> i32 {
        match self {
            LineItem::Content(l) => l.sequence,
            LineItem::Structural(l) => l.sequence,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LineItem::Content(l) => &l.name,
            LineItem::Structural(l) => &l.name,
        }
    }

    pub fn section(sequence: i32, name: impl Into<String>) -> Self {
        LineItem::Structural(StructuralLine {
            kind: StructuralKind::Section,
            sequence,
            name: name.into(),
        })
    }

    pub fn note(sequence: i32, name: impl Into<String>) -> Self {
        LineItem::Structural(StructuralLine {
            kind: StructuralKind::Note,
            sequence,
            name: name.into(),
        })
    }
}

/// Placeholder name of invoices that were never posted.
pub const DRAFT_NAME: &str = "/";

/// Invoice record (header + ordered lines).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Sequence name assigned at posting (e.g. `INV/2024/0007`).
    pub name: String,
    pub move_type: MoveType,
    pub state: InvoiceState,
    pub payment_state: PaymentState,
    pub customer: CustomerId,
    pub journal: Option<JournalId>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
    pub lines: Vec<LineItem>,
    /// Source-store identity when this invoice is a replica.
    pub original_invoice_id: Option<InvoiceId>,
    /// Set on the source once it has been replicated.
    pub synced: bool,
    pub partition: Option<PartitionId>,
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Invoice {
    pub fn is_posted(&self) -> bool {
        self.state == InvoiceState::Posted
    }

    /// Lines ordered by `sequence`; ties keep their stored order.
    pub fn lines_in_sequence(&self) -> Vec<&LineItem> {
        let mut lines: Vec<&LineItem> = self.lines.iter().collect();
        lines.sort_by_key(|l| l.sequence());
        lines
    }

    pub fn untaxed_total(&self) -> f64 {
        self.lines
            .iter()
            .filter_map(|l| match l {
                LineItem::Content(c) => Some(c.subtotal()),
                LineItem::Structural(_) => None,
            })
            .sum()
    }

    /// Draft → posted transition, assigning the sequence name.
    pub fn post(&mut self, name: impl Into<String>) -> Result<(), DomainError> {
        match self.state {
            InvoiceState::Posted => return Err(DomainError::conflict("invoice is already posted")),
            InvoiceState::Cancel => {
                return Err(DomainError::invariant("cannot post a cancelled invoice"));
            }
            InvoiceState::Draft => {}
        }
        if self.journal.is_none() {
            return Err(DomainError::invariant("cannot post an invoice without a journal"));
        }
        if !self.lines.iter().any(|l| matches!(l, LineItem::Content(_))) {
            return Err(DomainError::validation("cannot post an invoice without lines"));
        }
        self.state = InvoiceState::Posted;
        if self.name == DRAFT_NAME || self.name.is_empty() {
            self.name = name.into();
        }
        Ok(())
    }

    /// Reassign the journal. Posted invoices keep their name and sequence;
    /// only cancelled ones refuse the change.
    pub fn assign_journal(&mut self, journal: JournalId) -> Result<(), DomainError> {
        if self.journal == Some(journal) {
            return Ok(());
        }
        if self.state == InvoiceState::Cancel {
            return Err(DomainError::invariant(
                "journal of a cancelled invoice cannot be changed",
            ));
        }
        self.journal = Some(journal);
        Ok(())
    }
}

/// Values for creating an invoice. Stores always create it as a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub customer: CustomerId,
    pub move_type: MoveType,
    pub journal: JournalId,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
    pub lines: Vec<LineItem>,
    pub original_invoice_id: Option<InvoiceId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(sequence: i32, name: &str, quantity: f64, price_unit: f64) -> LineItem {
        LineItem::Content(ContentLine {
            sequence,
            name: name.to_string(),
            quantity,
            price_unit,
            discount: 0.0,
            tax_ids: vec![],
            account: None,
        })
    }

    fn draft(lines: Vec<LineItem>) -> Invoice {
        Invoice {
            id: InvoiceId::new(1),
            name: DRAFT_NAME.to_string(),
            move_type: MoveType::OutInvoice,
            state: InvoiceState::Draft,
            payment_state: PaymentState::NotPaid,
            customer: CustomerId::new(1),
            journal: Some(JournalId::new(1)),
            invoice_date: None,
            due_date: None,
            payment_reference: None,
            lines,
            original_invoice_id: None,
            synced: false,
            partition: None,
        }
    }

    #[test]
    fn untaxed_total_ignores_structural_lines() {
        let invoice = draft(vec![content(10, "Widget", 2.0, 10.0), LineItem::section(20, "Extras")]);
        assert!((invoice.untaxed_total() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn discount_reduces_subtotal() {
        let LineItem::Content(mut line) = content(1, "Widget", 4.0, 25.0) else {
            unreachable!()
        };
        line.discount = 10.0;
        assert!((line.subtotal() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn lines_in_sequence_is_stable_for_ties() {
        let invoice = draft(vec![
            content(20, "b", 1.0, 1.0),
            LineItem::note(10, "first"),
            content(20, "c", 1.0, 1.0),
        ]);
        let names: Vec<&str> = invoice.lines_in_sequence().iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["first", "b", "c"]);
    }

    #[test]
    fn posting_assigns_name_once() {
        let mut invoice = draft(vec![content(1, "Widget", 1.0, 1.0)]);
        invoice.post("INV/2024/0001").unwrap();
        assert!(invoice.is_posted());
        assert_eq!(invoice.name, "INV/2024/0001");
        assert!(matches!(invoice.post("INV/2024/0002"), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn posting_requires_content_lines() {
        let mut invoice = draft(vec![LineItem::section(1, "Only a heading")]);
        assert!(matches!(invoice.post("X"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn posted_invoice_can_move_journal_without_renaming() {
        let mut invoice = draft(vec![content(1, "Widget", 1.0, 1.0)]);
        invoice.assign_journal(JournalId::new(51)).unwrap();
        invoice.post("INV/1").unwrap();

        invoice.assign_journal(JournalId::new(50)).unwrap();
        assert_eq!(invoice.journal, Some(JournalId::new(50)));
        assert_eq!(invoice.name, "INV/1");
        assert_eq!(invoice.state, InvoiceState::Posted);
    }

    #[test]
    fn cancelled_invoice_keeps_its_journal() {
        let mut invoice = draft(vec![content(1, "Widget", 1.0, 1.0)]);
        invoice.assign_journal(JournalId::new(51)).unwrap();
        invoice.state = InvoiceState::Cancel;
        assert!(invoice.assign_journal(JournalId::new(51)).is_ok());
        assert!(invoice.assign_journal(JournalId::new(50)).is_err());
    }

    proptest::proptest! {
        #[test]
        fn lines_in_sequence_is_a_sorted_permutation(seqs in proptest::collection::vec(0i32..5, 0..20)) {
            let lines: Vec<LineItem> = seqs
                .iter()
                .enumerate()
                .map(|(i, &seq)| LineItem::note(seq, i.to_string()))
                .collect();
            let invoice = draft(lines);
            let ordered = invoice.lines_in_sequence();

            proptest::prop_assert_eq!(ordered.len(), seqs.len());
            for pair in ordered.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                proptest::prop_assert!(a.sequence() <= b.sequence());
                if a.sequence() == b.sequence() {
                    let (ia, ib): (usize, usize) = (a.name().parse().unwrap(), b.name().parse().unwrap());
                    proptest::prop_assert!(ia < ib);
                }
            }
        }
    }
}
