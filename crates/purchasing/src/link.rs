use serde::{Deserialize, Serialize};

use ledgerbridge_core::ProcurementGroupId;
use ledgerbridge_sales::SaleOrder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub name: String,
    /// Source document reference (e.g. `"S00042"` or `"S00042, S00043"`).
    pub origin: Option<String>,
    pub procurement_group: Option<ProcurementGroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingOrder {
    pub name: String,
    pub origin: Option<String>,
    pub procurement_group: Option<ProcurementGroupId>,
}

/// How a purchase/manufacturing document is recognised as belonging to a sale.
pub trait LinkStrategy {
    fn links(
        &self,
        sale: &SaleOrder,
        origin: Option<&str>,
        group: Option<ProcurementGroupId>,
    ) -> bool;
}

/// Origin contains the sale order name (case-insensitive).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvenanceMatch;

impl LinkStrategy for ProvenanceMatch {
    fn links(&self, sale: &SaleOrder, origin: Option<&str>, _group: Option<ProcurementGroupId>) -> bool {
        if sale.name.is_empty() {
            return false;
        }
        origin
            .map(|o| o.to_lowercase().contains(&sale.name.to_lowercase()))
            .unwrap_or(false)
    }
}

/// Same procurement group as the sale order.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupKeyMatch;

impl LinkStrategy for GroupKeyMatch {
    fn links(&self, sale: &SaleOrder, _origin: Option<&str>, group: Option<ProcurementGroupId>) -> bool {
        match (sale.procurement_group, group) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedCounts {
    pub purchase_orders: usize,
    pub manufacturing_orders: usize,
}

impl LinkedCounts {
    pub fn count<S: LinkStrategy>(
        strategy: &S,
        sale: &SaleOrder,
        purchases: &[PurchaseOrder],
        productions: &[ManufacturingOrder],
    ) -> Self {
        Self {
            purchase_orders: purchases
                .iter()
                .filter(|p| strategy.links(sale, p.origin.as_deref(), p.procurement_group))
                .count(),
            manufacturing_orders: productions
                .iter()
                .filter(|m| strategy.links(sale, m.origin.as_deref(), m.procurement_group))
                .count(),
        }
    }
}

/// A new manufacturing order whose origin names a sale order joins that order's
/// procurement group. Returns whether the group changed.
pub fn adopt_procurement_group(production: &mut ManufacturingOrder, sales: &[SaleOrder]) -> bool {
    let Some(origin) = production.origin.as_deref() else {
        return false;
    };
    match sales.iter().find(|s| s.name == origin) {
        Some(sale) if production.procurement_group != sale.procurement_group => {
            production.procurement_group = sale.procurement_group;
            true
        }
        _ => false,
    }
}

/// After a sale is confirmed under a new name, purchase orders whose origin is
/// exactly the old name follow the rename. Returns the number of renamed orders.
pub fn rename_origins(purchases: &mut [PurchaseOrder], old_name: &str, new_name: &str) -> usize {
    if old_name.is_empty() || new_name.is_empty() || old_name == new_name {
        return 0;
    }
    let mut renamed = 0;
    for po in purchases.iter_mut() {
        if po.origin.as_deref() == Some(old_name) {
            po.origin = Some(new_name.to_string());
            renamed += 1;
        }
    }
    renamed
}
