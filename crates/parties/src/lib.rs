//! Parties domain module (customers as the ERP stores keep them).
//!
//! Pure data + invariants only: no IO, no storage.

pub mod party;

pub use party::{ContactInfo, Customer, CustomerDraft};
