//! `ledgerbridge-core`: shared building blocks for the ERP bridge crates.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! record identifiers as the ERP stores hand them out, store names, and the
//! domain error model.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::DomainError;
pub use id::{
    AccountId, CountryId, CurrencyId, CustomerId, InvoiceId, JournalId, LedgerLineId,
    PartitionId, PaymentId, PaymentMethodLineId, ProcurementGroupId, StoreName, TaxId, UserId,
};
