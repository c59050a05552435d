//! Sales domain module: sale orders, deliveries and their packing list figures.
//!
//! Pure computed-field arithmetic over records the ERP store owns.

pub mod order;
pub mod packing;

pub use order::{Picking, SaleOrder, SaleOrderLine, StockMove, search_by_line_description};
pub use packing::{CubageCalculator, Dimensions, PackingFigures, PackingProfile, MAX_BOXES};
