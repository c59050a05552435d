//! Accounting module: journals, taxes, ledger lines and reconciliation rules.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod journal;
pub mod ledger;
pub mod tax;

pub use journal::{Journal, JournalKind};
pub use ledger::{EntryRef, LedgerLine, ReconcileOutcome, ReconciliationPlan, open_reconcilable};
pub use tax::Tax;
