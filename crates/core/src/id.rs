//! Strongly-typed identifiers used across the domain.
//!
//! ERP stores hand out integer record ids that are only meaningful inside the
//! store that issued them. Each record kind gets its own newtype so an invoice id
//! from the primary store can never be passed where a tax id is expected.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

macro_rules! record_id {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(u64);

        impl $t {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<u64> for $t {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for u64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = u64::from_str(s.trim())
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                if raw == 0 {
                    return Err(DomainError::invalid_id(format!("{}: zero is not a record id", $name)));
                }
                Ok(Self(raw))
            }
        }
    };
}

record_id!(
    /// Invoice (journal entry of type invoice/bill).
    InvoiceId, "InvoiceId"
);
record_id!(PaymentId, "PaymentId");
record_id!(CustomerId, "CustomerId");
record_id!(TaxId, "TaxId");
record_id!(JournalId, "JournalId");
record_id!(AccountId, "AccountId");
record_id!(PaymentMethodLineId, "PaymentMethodLineId");
record_id!(
    /// A single debit/credit line of an invoice or payment entry.
    LedgerLineId, "LedgerLineId"
);
record_id!(
    /// Organizational partition (company) inside a store.
    PartitionId, "PartitionId"
);
record_id!(UserId, "UserId");
record_id!(CountryId, "CountryId");
record_id!(CurrencyId, "CurrencyId");
record_id!(ProcurementGroupId, "ProcurementGroupId");

/// Configuration-level name of a store (database) taking part in replication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreName(String);

impl StoreName {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("store name must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Built-in names; must already be trimmed and non-empty.
    pub fn from_static(name: &'static str) -> Self {
        debug_assert!(!name.trim().is_empty() && name.trim() == name);
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for StoreName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StoreName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
