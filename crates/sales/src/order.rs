//! Sale orders and deliveries with packing totals.

use serde::{Deserialize, Serialize};

use ledgerbridge_core::{DomainError, ProcurementGroupId};

use crate::packing::{CubageCalculator, PackingFigures, PackingProfile};

/// Sale order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleOrderLine {
    pub name: String,
    pub quantity: f64,
    /// Packing data of the ordered product; `None` for lines without a product.
    pub product_packing: Option<PackingProfile>,
    /// Figures written by the cubage calculator, replacing the computed ones.
    pub packing_override: Option<PackingFigures>,
}

impl SaleOrderLine {
    pub fn packing(&self) -> PackingFigures {
        if let Some(figures) = self.packing_override {
            return figures;
        }
        self.product_packing
            .as_ref()
            .map(|p| p.per_unit().scaled(self.quantity))
            .unwrap_or_default()
    }

    pub fn apply_calculation(&mut self, calc: &CubageCalculator) -> Result<(), DomainError> {
        self.packing_override = Some(calc.compute()?);
        Ok(())
    }
}

/// Sale order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleOrder {
    pub name: String,
    pub procurement_group: Option<ProcurementGroupId>,
    pub lines: Vec<SaleOrderLine>,
}

impl SaleOrder {
    pub fn packing_totals(&self) -> PackingFigures {
        self.lines.iter().map(SaleOrderLine::packing).sum()
    }

    /// All line names joined for list views.
    pub fn line_description(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Case-insensitive "contains" over line names.
    pub fn has_line_matching(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.lines.iter().any(|l| l.name.to_lowercase().contains(&needle))
    }

    /// Push each line's packing figures onto the stock moves generated from it.
    pub fn sync_moves(&self, moves: &mut [StockMove]) {
        for mv in moves.iter_mut() {
            if let Some(line) = mv.sale_line.and_then(|i| self.lines.get(i)) {
                mv.packing_override = Some(line.packing());
            }
        }
    }
}

/// Orders having at least one line whose name contains `needle`.
pub fn search_by_line_description<'a>(orders: &'a [SaleOrder], needle: &str) -> Vec<&'a SaleOrder> {
    orders.iter().filter(|o| o.has_line_matching(needle)).collect()
}

/// Stock move of a delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMove {
    pub quantity: f64,
    pub product_packing: Option<PackingProfile>,
    /// Index of the originating line in its sale order.
    pub sale_line: Option<usize>,
    pub packing_override: Option<PackingFigures>,
}

impl StockMove {
    pub fn packing(&self) -> PackingFigures {
        if let Some(figures) = self.packing_override {
            return figures;
        }
        self.product_packing
            .as_ref()
            .map(|p| p.per_unit().scaled(self.quantity))
            .unwrap_or_default()
    }
}

/// Delivery (stock picking).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Picking {
    pub moves: Vec<StockMove>,
}

impl Picking {
    pub fn packing_totals(&self) -> PackingFigures {
        self.moves.iter().map(StockMove::packing).sum()
    }
}
