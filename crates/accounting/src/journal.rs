use serde::{Deserialize, Serialize};

use ledgerbridge_core::{AccountId, Entity, JournalId, PartitionId};

/// Journal type (determines which documents may be booked into it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalKind {
    Sale,
    Purchase,
    Cash,
    Bank,
    General,
}

/// Accounting journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    pub name: String,
    pub kind: JournalKind,
    /// Account used for invoice lines booked into this journal.
    pub default_account: Option<AccountId>,
    pub partition: Option<PartitionId>,
}

impl Journal {
    pub fn is_sale(&self) -> bool {
        self.kind == JournalKind::Sale
    }
}

impl Entity for Journal {
    type Id = JournalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}
