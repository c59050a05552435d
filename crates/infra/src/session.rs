//! Explicit session context.
//!
//! Every store call carries the store it targets, the partitions it may see and
//! the identity it acts as. Nothing is taken from ambient state.

use serde::{Deserialize, Serialize};

use ledgerbridge_core::{PartitionId, StoreName, UserId};

/// Which organizational partitions a session sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum PartitionScope {
    /// The store's default partition only.
    Default,
    /// The listed partitions; new records land in `active`.
    Explicit {
        allowed: Vec<PartitionId>,
        active: PartitionId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    store: StoreName,
    user: UserId,
    scope: PartitionScope,
}

impl SessionContext {
    pub fn new(store: StoreName, user: UserId) -> Self {
        Self {
            store,
            user,
            scope: PartitionScope::Default,
        }
    }

    /// Widen the scope to every given partition, the first one being active.
    ///
    /// Returns `None` when `partitions` is empty.
    pub fn with_all_partitions(self, partitions: &[PartitionId]) -> Option<Self> {
        let active = *partitions.first()?;
        Some(Self {
            scope: PartitionScope::Explicit {
                allowed: partitions.to_vec(),
                active,
            },
            ..self
        })
    }

    pub fn store(&self) -> &StoreName {
        &self.store
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn scope(&self) -> &PartitionScope {
        &self.scope
    }
}
