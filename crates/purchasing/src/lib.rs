//! Purchasing / manufacturing linkage to sale orders.
//!
//! Purchase and manufacturing orders generated from a sale keep a reference back
//! to it, either as a free-text origin or as a shared procurement group.

pub mod link;

pub use link::{
    GroupKeyMatch, LinkStrategy, LinkedCounts, ManufacturingOrder, ProvenanceMatch, PurchaseOrder,
    adopt_procurement_group, rename_origins,
};
