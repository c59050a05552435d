use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ledgerbridge_core::{
    CurrencyId, CustomerId, DomainError, Entity, InvoiceId, JournalId, PartitionId, PaymentId,
    PaymentMethodLineId,
};

/// Method code of payments settled by hand (no electronic transfer).
pub const MANUAL_METHOD_CODE: &str = "manual";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerType {
    Customer,
    Supplier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Draft,
    Posted,
    Cancel,
}

/// Payment method available on a journal (e.g. "Manual Payment", "SEPA").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodLine {
    pub id: PaymentMethodLineId,
    pub name: String,
    pub code: String,
    pub journal: Option<JournalId>,
}

impl PaymentMethodLine {
    pub fn is_manual(&self) -> bool {
        self.code == MANUAL_METHOD_CODE
    }
}

impl Entity for PaymentMethodLine {
    type Id = PaymentMethodLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// Payment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub name: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub payment_method_line: Option<PaymentMethodLineId>,
    pub payment_type: PaymentType,
    pub partner_type: PartnerType,
    pub partner: CustomerId,
    pub currency: CurrencyId,
    /// Free-text reference; holds the name of the invoice being paid.
    pub reference: Option<String>,
    pub state: PaymentStatus,
    /// Replicated to the target store.
    pub synced: bool,
    /// Marked as sent by the reconciliation finalizer.
    pub sent: bool,
    pub partition: Option<PartitionId>,
}

impl Payment {
    pub fn is_posted(&self) -> bool {
        self.state == PaymentStatus::Posted
    }

    /// Reference exactly as entered; `None` when missing or blank.
    ///
    /// Invoice names must equal it verbatim, so padding is kept.
    pub fn invoice_reference(&self) -> Option<&str> {
        self.reference.as_deref().filter(|r| !r.trim().is_empty())
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// Input of a store's payment-registration workflow against one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRegistration {
    pub invoice: InvoiceId,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub journal: JournalId,
    pub payment_method_line: PaymentMethodLineId,
    pub payment_type: PaymentType,
    pub partner_type: PartnerType,
    pub partner: CustomerId,
    pub currency: CurrencyId,
}

impl PaymentRegistration {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        Ok(())
    }
}
