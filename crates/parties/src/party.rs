use serde::{Deserialize, Serialize};

use ledgerbridge_core::{CountryId, CustomerId, DomainError, Entity, PartitionId};

/// Contact and fiscal attributes copied verbatim when a customer is replicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country_id: Option<CountryId>,
    /// Tax identification number.
    pub vat: Option<String>,
}

/// A customer record owned by one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub contact: ContactInfo,
    /// Number of sales documents referencing this partner; > 0 marks a customer.
    pub customer_rank: u32,
    /// Owning partition; `None` means shared across all partitions.
    pub partition: Option<PartitionId>,
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// Values for creating a customer in a store that does not know it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDraft {
    pub name: String,
    pub contact: ContactInfo,
    pub customer_rank: u32,
}

impl CustomerDraft {
    /// Copy a source customer's name and contact fields; the copy is always ranked as a customer.
    pub fn copy_of(source: &Customer) -> Self {
        Self {
            name: source.name.clone(),
            contact: source.contact.clone(),
            customer_rank: 1,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("customer name must not be empty"));
        }
        Ok(())
    }
}
