//! Sync error taxonomy.
//!
//! Pipelines return [`SyncError`]. The top-level actions collapse it into a
//! [`UserFacingError`]: one descriptive message plus the kind, which the HTTP
//! layer maps to a status code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerbridge_infra::{SagaLogError, StoreError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Source or target record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Journal reassignment or posting in the primary store failed.
    #[error("could not confirm invoice in primary store: {0}")]
    ConfirmationFailed(#[source] StoreError),

    /// The target store lacks a journal, account or partition replication needs.
    #[error("target store is not configured: {0}")]
    ConfigurationMissing(String),

    #[error("failed to replicate invoice: {0}")]
    ReplicationFailed(String),

    /// No target invoice carries the payment's reference as its name.
    #[error("no invoice named {0:?} in target store")]
    InvoiceNotFound(String),

    #[error("invoice {0} is not posted in target store")]
    InvoiceNotPosted(String),

    #[error("no payment method available in target store")]
    NoPaymentMethod,

    #[error("failed to sync payment: {0}")]
    PaymentSyncFailed(String),

    /// Never aborts a batch; reported per payment.
    #[error("reconciliation failed: {0}")]
    ReconciliationFailed(String),

    /// Another run holds the idempotency key of this record.
    #[error("sync of {0} is already in progress")]
    SyncInProgress(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("saga log error: {0}")]
    SagaLog(SagaLogError),
}

impl From<SagaLogError> for SyncError {
    fn from(err: SagaLogError) -> Self {
        match err {
            SagaLogError::InFlight(key) | SagaLogError::Superseded(key) => SyncError::SyncInProgress(key.to_string()),
            other => SyncError::SagaLog(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    NotFound,
    ConfirmationFailed,
    ConfigurationMissing,
    ReplicationFailed,
    InvoiceNotFound,
    InvoiceNotPosted,
    NoPaymentMethod,
    PaymentSyncFailed,
    ReconciliationFailed,
    SyncInProgress,
    Store,
    SagaLog,
}

impl SyncErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncErrorKind::NotFound => "not_found",
            SyncErrorKind::ConfirmationFailed => "confirmation_failed",
            SyncErrorKind::ConfigurationMissing => "configuration_missing",
            SyncErrorKind::ReplicationFailed => "replication_failed",
            SyncErrorKind::InvoiceNotFound => "invoice_not_found",
            SyncErrorKind::InvoiceNotPosted => "invoice_not_posted",
            SyncErrorKind::NoPaymentMethod => "no_payment_method",
            SyncErrorKind::PaymentSyncFailed => "payment_sync_failed",
            SyncErrorKind::ReconciliationFailed => "reconciliation_failed",
            SyncErrorKind::SyncInProgress => "sync_in_progress",
            SyncErrorKind::Store => "store_error",
            SyncErrorKind::SagaLog => "saga_log_error",
        }
    }
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::NotFound(_) => SyncErrorKind::NotFound,
            SyncError::ConfirmationFailed(_) => SyncErrorKind::ConfirmationFailed,
            SyncError::ConfigurationMissing(_) => SyncErrorKind::ConfigurationMissing,
            SyncError::ReplicationFailed(_) => SyncErrorKind::ReplicationFailed,
            SyncError::InvoiceNotFound(_) => SyncErrorKind::InvoiceNotFound,
            SyncError::InvoiceNotPosted(_) => SyncErrorKind::InvoiceNotPosted,
            SyncError::NoPaymentMethod => SyncErrorKind::NoPaymentMethod,
            SyncError::PaymentSyncFailed(_) => SyncErrorKind::PaymentSyncFailed,
            SyncError::ReconciliationFailed(_) => SyncErrorKind::ReconciliationFailed,
            SyncError::SyncInProgress(_) => SyncErrorKind::SyncInProgress,
            SyncError::Store(_) => SyncErrorKind::Store,
            SyncError::SagaLog(_) => SyncErrorKind::SagaLog,
        }
    }
}

/// Error surfaced to whoever triggered a sync action.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct UserFacingError {
    pub kind: SyncErrorKind,
    pub message: String,
}

impl From<SyncError> for UserFacingError {
    fn from(err: SyncError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
