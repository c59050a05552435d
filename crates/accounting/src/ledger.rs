//! Ledger lines and the rules for reconciling them.

use serde::{Deserialize, Serialize};

use ledgerbridge_core::{AccountId, DomainError, InvoiceId, LedgerLineId, PaymentId};

/// Entry a ledger line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntryRef {
    Invoice(InvoiceId),
    Payment(PaymentId),
}

/// One debit/credit line of an invoice or payment entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub id: LedgerLineId,
    pub entry: EntryRef,
    pub account: AccountId,
    /// Whether the line's account allows reconciliation (receivable/payable).
    pub account_reconcilable: bool,
    pub reconciled: bool,
    pub debit: f64,
    pub credit: f64,
}

impl LedgerLine {
    pub fn balance(&self) -> f64 {
        self.debit - self.credit
    }

    /// Line can still take part in a reconciliation.
    pub fn is_open_reconcilable(&self) -> bool {
        self.account_reconcilable && !self.reconciled
    }
}

/// Lines of an entry that sit on a reconcilable account and are not reconciled yet.
pub fn open_reconcilable(lines: &[LedgerLine]) -> Vec<LedgerLine> {
    lines
        .iter()
        .filter(|l| l.is_open_reconcilable())
        .cloned()
        .collect()
}

/// Result of reconciling a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Debits and credits cancel out; every line is now reconciled.
    Full,
    /// An open residual remains; lines stay open.
    Partial { residual: f64 },
}

/// Validated set of lines ready to be reconciled together.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationPlan {
    lines: Vec<LedgerLine>,
    account: AccountId,
}

const BALANCE_EPSILON: f64 = 0.005;

impl ReconciliationPlan {
    /// Check the reconciliation rules: at least two lines, all open on a
    /// reconcilable account, all on the same account.
    pub fn build(lines: Vec<LedgerLine>) -> Result<Self, DomainError> {
        let Some(first) = lines.first() else {
            return Err(DomainError::validation("nothing to reconcile"));
        };
        let account = first.account;

        if lines.len() < 2 {
            return Err(DomainError::validation(
                "reconciliation needs at least two lines",
            ));
        }
        for line in &lines {
            if !line.account_reconcilable {
                return Err(DomainError::invariant(format!(
                    "account {} of line {} does not allow reconciliation",
                    line.account, line.id
                )));
            }
            if line.reconciled {
                return Err(DomainError::conflict(format!(
                    "line {} is already reconciled",
                    line.id
                )));
            }
            if line.account != account {
                return Err(DomainError::invariant(format!(
                    "entries are not from the same account ({} vs {})",
                    account, line.account
                )));
            }
        }

        Ok(Self { lines, account })
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn line_ids(&self) -> Vec<LedgerLineId> {
        self.lines.iter().map(|l| l.id).collect()
    }

    pub fn residual(&self) -> f64 {
        self.lines.iter().map(LedgerLine::balance).sum()
    }

    pub fn outcome(&self) -> ReconcileOutcome {
        let residual = self.residual();
        if residual.abs() < BALANCE_EPSILON {
            ReconcileOutcome::Full
        } else {
            ReconcileOutcome::Partial { residual }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(id: u64, entry: EntryRef, debit: f64, credit: f64) -> LedgerLine {
        LedgerLine {
            id: LedgerLineId::new(id),
            entry,
            account: AccountId::new(1200),
            account_reconcilable: true,
            reconciled: false,
            debit,
            credit,
        }
    }

    fn invoice() -> EntryRef {
        EntryRef::Invoice(InvoiceId::new(1))
    }

    fn payment() -> EntryRef {
        EntryRef::Payment(PaymentId::new(1))
    }

    #[test]
    fn open_reconcilable_skips_reconciled_and_plain_accounts() {
        let mut closed = line(2, invoice(), 0.0, 10.0);
        closed.reconciled = true;
        let mut revenue = line(3, invoice(), 0.0, 10.0);
        revenue.account_reconcilable = false;
        let lines = vec![line(1, invoice(), 10.0, 0.0), closed, revenue];

        let open = open_reconcilable(&lines);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, LedgerLineId::new(1));
    }

    #[test]
    fn balanced_lines_reconcile_fully() {
        let plan = ReconciliationPlan::build(vec![
            line(1, invoice(), 123.0, 0.0),
            line(2, payment(), 0.0, 123.0),
        ])
        .unwrap();
        assert_eq!(plan.outcome(), ReconcileOutcome::Full);
    }

    #[test]
    fn mixed_accounts_are_rejected() {
        let mut other = line(2, payment(), 0.0, 50.0);
        other.account = AccountId::new(2200);
        let err = ReconciliationPlan::build(vec![line(1, invoice(), 50.0, 0.0), other]).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn single_line_is_rejected() {
        assert!(ReconciliationPlan::build(vec![line(1, invoice(), 5.0, 0.0)]).is_err());
        assert!(ReconciliationPlan::build(vec![]).is_err());
    }

    proptest! {
        #[test]
        fn partial_payment_leaves_residual(total in 1u32..100_000, paid in 1u32..100_000) {
            prop_assume!(paid < total);
            let plan = ReconciliationPlan::build(vec![
                line(1, invoice(), f64::from(total), 0.0),
                line(2, payment(), 0.0, f64::from(paid)),
            ]).unwrap();
            match plan.outcome() {
                ReconcileOutcome::Partial { residual } => {
                    prop_assert!((residual - f64::from(total - paid)).abs() < 1e-9);
                }
                ReconcileOutcome::Full => prop_assert!(false, "expected a residual"),
            }
        }
    }
}
