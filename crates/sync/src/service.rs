//! Sync actions as invoked by a user.
//!
//! Each action runs as a saga keyed by an [`IdempotencyKey`]: completed runs
//! return their earlier result without writing, and a run that failed half-way
//! resumes after its last recorded step.

use std::sync::Arc;

use ledgerbridge_core::{InvoiceId, JournalId, PaymentId, UserId};
use ledgerbridge_infra::{
    Claim, ClaimToken, ErpStore, IdempotencyKey, SagaKind, SagaLog, SagaStep, SessionContext, SyncConfig,
};

use crate::confirmer::SourceConfirmer;
use crate::error::{SyncError, UserFacingError};
use crate::invoice_replicator::{InvoiceReplicator, SourceInvoice, TargetCapabilities, flag_source_invoice};
use crate::payment_replicator::{PaymentReplicator, SourcePayment, flag_source_payment};
use crate::reconciliation::{PaymentOutcome, ReconciliationFinalizer};
use crate::resolver::{EntityResolver, NameResolver};

/// Progress through an invoice saga, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum InvoiceProgress {
    Started,
    SourceConfirmed,
    CustomerResolved,
    TargetCreated,
    SourceFlagged,
}

impl From<Option<SagaStep>> for InvoiceProgress {
    fn from(step: Option<SagaStep>) -> Self {
        match step {
            None | Some(SagaStep::PaymentRegistered { .. }) => InvoiceProgress::Started,
            Some(SagaStep::SourceConfirmed) => InvoiceProgress::SourceConfirmed,
            Some(SagaStep::CustomerResolved { .. }) => InvoiceProgress::CustomerResolved,
            Some(SagaStep::TargetCreated { .. }) => InvoiceProgress::TargetCreated,
            Some(SagaStep::SourceFlagged) => InvoiceProgress::SourceFlagged,
        }
    }
}

pub struct SyncService {
    primary: Arc<dyn ErpStore>,
    target: Arc<dyn ErpStore>,
    saga: Arc<dyn SagaLog>,
    resolver: Arc<dyn EntityResolver>,
    capabilities: TargetCapabilities,
    confirmation_journal: JournalId,
    payment_journal: JournalId,
}

impl SyncService {
    pub fn new(
        primary: Arc<dyn ErpStore>,
        target: Arc<dyn ErpStore>,
        saga: Arc<dyn SagaLog>,
        capabilities: TargetCapabilities,
        config: &SyncConfig,
    ) -> Self {
        Self {
            primary,
            target,
            saga,
            resolver: Arc::new(NameResolver),
            capabilities,
            confirmation_journal: config.confirmation_journal_id,
            payment_journal: config.payment_journal_id,
        }
    }

    /// Swap the matching strategy (e.g. for an identity-mapping table).
    pub fn with_resolver(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn capabilities(&self) -> TargetCapabilities {
        self.capabilities
    }

    fn primary_ctx(&self, user: UserId) -> SessionContext {
        SessionContext::new(self.primary.name().clone(), user)
    }

    fn target_ctx(&self, user: UserId) -> SessionContext {
        SessionContext::new(self.target.name().clone(), user)
    }

    fn key(&self, kind: SagaKind, source_id: u64) -> IdempotencyKey {
        IdempotencyKey::new(kind, self.primary.name(), source_id, self.target.name())
    }

    /// "Sync invoice" action.
    pub fn sync_invoice(&self, user: UserId, invoice: InvoiceId) -> Result<bool, UserFacingError> {
        self.replicate_invoice(user, invoice).map(|_| true).map_err(UserFacingError::from)
    }

    /// "Sync payment" action.
    pub fn sync_payment(&self, user: UserId, payment: PaymentId) -> Result<bool, UserFacingError> {
        self.replicate_payment(user, payment).map(|_| true).map_err(UserFacingError::from)
    }

    /// "Mark as sent" action over a batch of primary-store payments.
    pub fn mark_payments_sent(&self, user: UserId, payments: &[PaymentId]) -> Vec<PaymentOutcome> {
        let ctx = self.primary_ctx(user);
        ReconciliationFinalizer::new(&*self.primary).mark_sent(&ctx, payments)
    }

    /// Confirm the source invoice and replicate it; returns the target invoice.
    pub fn replicate_invoice(&self, user: UserId, invoice: InvoiceId) -> Result<InvoiceId, SyncError> {
        let key = self.key(SagaKind::Invoice, invoice.get());
        tracing::info!(invoice_id = %invoice, %key, "starting invoice synchronization");

        let (token, progress, target) = match self.saga.claim(key)? {
            Claim::Completed { target_id } => {
                tracing::info!(invoice_id = %invoice, target_invoice = target_id, "invoice already synchronized");
                return Ok(InvoiceId::new(target_id));
            }
            Claim::Fresh { token } => (token, InvoiceProgress::Started, None),
            Claim::Resume {
                last_step,
                target_id,
                token,
            } => {
                tracing::warn!(invoice_id = %invoice, ?last_step, "resuming interrupted invoice synchronization");
                (token, InvoiceProgress::from(last_step), target_id.map(InvoiceId::new))
            }
        };

        let result = self.run_invoice_saga(user, invoice, token, progress, target);
        self.settle(token, &result.as_ref().map(|id| id.get()).map_err(Clone::clone))?;
        result
    }

    fn run_invoice_saga(
        &self,
        user: UserId,
        invoice: InvoiceId,
        token: ClaimToken,
        progress: InvoiceProgress,
        target: Option<InvoiceId>,
    ) -> Result<InvoiceId, SyncError> {
        if progress < InvoiceProgress::SourceConfirmed {
            SourceConfirmer::new(&*self.primary, self.confirmation_journal).confirm(self.primary_ctx(user), invoice)?;
            self.saga.record(token, SagaStep::SourceConfirmed)?;
        }

        let target = match target {
            Some(target) if progress >= InvoiceProgress::TargetCreated => target,
            _ => {
                let source = {
                    let session = self.primary.open_session(self.primary_ctx(user))?;
                    SourceInvoice::load(&*session, invoice)?
                };
                let replicator = InvoiceReplicator::new(&*self.target, &*self.resolver, self.capabilities);
                let mut session = replicator.open(self.target_ctx(user))?;

                let customer = replicator.resolve_customer(&mut *session, &source.customer)?;
                self.saga.record(
                    token,
                    SagaStep::CustomerResolved {
                        customer_id: customer.get(),
                    },
                )?;

                let target = match replicator.find_existing(&*session, invoice)? {
                    Some(existing) => {
                        tracing::info!(invoice_id = %invoice, target_invoice = %existing, "adopting replica from an earlier run");
                        existing
                    }
                    None if source.invoice.synced => {
                        return Err(SyncError::ReplicationFailed(format!(
                            "invoice {} is already synced and its replica cannot be located",
                            source.invoice.name
                        )));
                    }
                    None => replicator.create_target(&mut *session, &source, customer)?,
                };
                self.saga.record(token, SagaStep::TargetCreated { target_id: target.get() })?;
                target
            }
        };

        if progress < InvoiceProgress::SourceFlagged {
            flag_source_invoice(&*self.primary, self.primary_ctx(user), invoice)?;
            self.saga.record(token, SagaStep::SourceFlagged)?;
        }
        tracing::info!(invoice_id = %invoice, target_invoice = %target, "invoice synchronized");
        Ok(target)
    }

    /// Replicate a source payment; returns the target payment.
    pub fn replicate_payment(&self, user: UserId, payment: PaymentId) -> Result<PaymentId, SyncError> {
        let key = self.key(SagaKind::Payment, payment.get());
        tracing::info!(payment_id = %payment, %key, "starting payment synchronization");

        let (token, registered, flagged) = match self.saga.claim(key)? {
            Claim::Completed { target_id } => {
                tracing::info!(payment_id = %payment, target_payment = target_id, "payment already synchronized");
                return Ok(PaymentId::new(target_id));
            }
            Claim::Fresh { token } => (token, None, false),
            Claim::Resume {
                last_step,
                target_id,
                token,
            } => {
                tracing::warn!(payment_id = %payment, ?last_step, "resuming interrupted payment synchronization");
                (
                    token,
                    target_id.map(PaymentId::new),
                    last_step == Some(SagaStep::SourceFlagged),
                )
            }
        };

        let result = self.run_payment_saga(user, payment, token, registered, flagged);
        self.settle(token, &result.as_ref().map(|id| id.get()).map_err(Clone::clone))?;
        result
    }

    fn run_payment_saga(
        &self,
        user: UserId,
        payment: PaymentId,
        token: ClaimToken,
        registered: Option<PaymentId>,
        flagged: bool,
    ) -> Result<PaymentId, SyncError> {
        let target = match registered {
            Some(target) => target,
            None => {
                let source = {
                    let session = self.primary.open_session(self.primary_ctx(user))?;
                    SourcePayment::load(&*session, payment)?
                };
                if source.payment.synced {
                    return Err(SyncError::PaymentSyncFailed(format!(
                        "payment {} is already synced",
                        source.payment.name
                    )));
                }
                let target = PaymentReplicator::new(&*self.target, &*self.resolver, self.payment_journal)
                    .replicate(self.target_ctx(user), &source)?;
                self.saga.record(token, SagaStep::PaymentRegistered { target_id: target.get() })?;
                target
            }
        };

        if !flagged {
            flag_source_payment(&*self.primary, self.primary_ctx(user), payment)?;
            self.saga.record(token, SagaStep::SourceFlagged)?;
        }
        tracing::info!(payment_id = %payment, target_payment = %target, "payment synchronized");
        Ok(target)
    }

    /// Close the saga. A failure to record a failure is only logged, so the
    /// caller still sees the original error.
    fn settle(&self, token: ClaimToken, result: &Result<u64, SyncError>) -> Result<(), SyncError> {
        match result {
            Ok(target_id) => Ok(self.saga.complete(token, *target_id)?),
            Err(err) => {
                tracing::error!(claim = %token, error = %err, "synchronization failed");
                if let Err(log_err) = self.saga.fail(token, &err.to_string()) {
                    tracing::warn!(claim = %token, error = %log_err, "could not record saga failure");
                }
                Ok(())
            }
        }
    }
}
