//! ERP store boundary.
//!
//! The ERP object model (partners, journals, taxes, invoices, payments) lives in
//! external stores. The bridge only reaches it through [`ErpStore`] and the
//! transactional [`StoreSession`]s it opens.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryErpStore;
pub use r#trait::{ErpStore, Note, Operation, StoreError, StoreSession};
