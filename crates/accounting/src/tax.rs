use serde::{Deserialize, Serialize};

use ledgerbridge_core::{Entity, PartitionId, TaxId};

/// Tax definition. Matched across stores by display name only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tax {
    pub id: TaxId,
    pub name: String,
    /// Percentage rate (e.g. `23.0` for 23 %).
    pub rate: f64,
    pub partition: Option<PartitionId>,
}

impl Entity for Tax {
    type Id = TaxId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}
