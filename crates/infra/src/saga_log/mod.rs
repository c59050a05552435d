//! Saga log: idempotency and progress tracking for cross-store replication.
//!
//! Replication writes to two stores without a shared transaction. Each run is
//! keyed by an [`IdempotencyKey`] derived from the source record and the target
//! store; the log records which steps completed so a re-invocation either
//! returns the earlier result or resumes where the previous run stopped.

mod in_memory;
mod postgres;

pub use in_memory::InMemorySagaLog;
pub use postgres::PostgresSagaLog;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use ledgerbridge_core::StoreName;

/// Fixed namespace so keys are identical across processes and restarts.
const KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6c65_6467_6572_4272_6964_6765_5379_6e63);

/// How long an in-flight claim blocks other claimants before it is treated as abandoned.
pub const DEFAULT_LEASE_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaKind {
    Invoice,
    Payment,
}

impl SagaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SagaKind::Invoice => "invoice",
            SagaKind::Payment => "payment",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "invoice" => Some(SagaKind::Invoice),
            "payment" => Some(SagaKind::Payment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    kind: SagaKind,
    id: Uuid,
}

impl IdempotencyKey {
    pub fn new(kind: SagaKind, source_store: &StoreName, source_id: u64, target_store: &StoreName) -> Self {
        let name = format!("{}:{}:{}->{}", kind.as_str(), source_store, source_id, target_store);
        Self {
            kind,
            id: Uuid::new_v5(&KEY_NAMESPACE, name.as_bytes()),
        }
    }

    pub fn kind(&self) -> SagaKind {
        self.kind
    }

    pub fn as_uuid(&self) -> Uuid {
        self.id
    }
}

impl core::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Completed step of a replication saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SagaStep {
    SourceConfirmed,
    CustomerResolved { customer_id: u64 },
    TargetCreated { target_id: u64 },
    PaymentRegistered { target_id: u64 },
    SourceFlagged,
}

impl SagaStep {
    /// Target record produced by this step, if any.
    pub fn target_id(&self) -> Option<u64> {
        match self {
            SagaStep::TargetCreated { target_id } | SagaStep::PaymentRegistered { target_id } => Some(*target_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    InFlight,
    Completed,
    Failed,
}

impl SagaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SagaStatus::InFlight => "in_flight",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_flight" => Some(SagaStatus::InFlight),
            "completed" => Some(SagaStatus::Completed),
            "failed" => Some(SagaStatus::Failed),
            _ => None,
        }
    }
}

/// Ownership of one claim on a key.
///
/// Every successful claim bumps the key's generation, so a run whose lease
/// was taken over can no longer write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimToken {
    key: IdempotencyKey,
    generation: u64,
}

impl ClaimToken {
    pub fn key(&self) -> IdempotencyKey {
        self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl core::fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.key, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaRecord {
    pub key: IdempotencyKey,
    pub status: SagaStatus,
    /// Generation of the latest claim; 1 for a fresh key.
    pub generation: u64,
    pub last_step: Option<SagaStep>,
    /// Target record created so far (set by `TargetCreated`/`PaymentRegistered`).
    pub target_id: Option<u64>,
    pub failure: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of claiming a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// First run for this key.
    Fresh { token: ClaimToken },
    /// A previous run failed or was abandoned; continue after `last_step`.
    Resume {
        last_step: Option<SagaStep>,
        target_id: Option<u64>,
        token: ClaimToken,
    },
    /// Already done; nothing must be written.
    Completed { target_id: u64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SagaLogError {
    #[error("saga {0} is already in flight")]
    InFlight(IdempotencyKey),

    #[error("saga {0} is not claimed")]
    NotClaimed(IdempotencyKey),

    #[error("claim on saga {0} was taken over by a newer run")]
    Superseded(IdempotencyKey),

    #[error("saga {0} is corrupt: {1}")]
    Corrupt(IdempotencyKey, String),

    #[error("saga log backend error: {0}")]
    Backend(String),
}

pub trait SagaLog: Send + Sync {
    /// Take ownership of `key` for one run.
    ///
    /// Fails with [`SagaLogError::InFlight`] while another run holds an
    /// unexpired claim on the same key.
    fn claim(&self, key: IdempotencyKey) -> Result<Claim, SagaLogError>;

    /// Updates below fail with [`SagaLogError::Superseded`] once a newer
    /// claim took the key over.
    fn record(&self, token: ClaimToken, step: SagaStep) -> Result<(), SagaLogError>;

    fn complete(&self, token: ClaimToken, target_id: u64) -> Result<(), SagaLogError>;

    /// Release the claim; the key may be claimed again later.
    fn fail(&self, token: ClaimToken, reason: &str) -> Result<(), SagaLogError>;

    fn get(&self, key: IdempotencyKey) -> Result<Option<SagaRecord>, SagaLogError>;
}

impl<S> SagaLog for Arc<S>
where
    S: SagaLog + ?Sized,
{
    fn claim(&self, key: IdempotencyKey) -> Result<Claim, SagaLogError> {
        (**self).claim(key)
    }

    fn record(&self, token: ClaimToken, step: SagaStep) -> Result<(), SagaLogError> {
        (**self).record(token, step)
    }

    fn complete(&self, token: ClaimToken, target_id: u64) -> Result<(), SagaLogError> {
        (**self).complete(token, target_id)
    }

    fn fail(&self, token: ClaimToken, reason: &str) -> Result<(), SagaLogError> {
        (**self).fail(token, reason)
    }

    fn get(&self, key: IdempotencyKey) -> Result<Option<SagaRecord>, SagaLogError> {
        (**self).get(key)
    }
}

fn fresh_claim(key: IdempotencyKey) -> Claim {
    Claim::Fresh {
        token: ClaimToken { key, generation: 1 },
    }
}

/// Claim rules for a key that already has a record. On `Resume` the caller
/// resets the record to in-flight under the token's generation.
fn evaluate_existing(record: &SagaRecord, now: DateTime<Utc>, lease: Duration) -> Result<Claim, SagaLogError> {
    match record.status {
        SagaStatus::Completed => match record.target_id {
            Some(target_id) => Ok(Claim::Completed { target_id }),
            None => Err(SagaLogError::Corrupt(record.key, "completed without a target".to_string())),
        },
        SagaStatus::InFlight if now - record.updated_at < lease => Err(SagaLogError::InFlight(record.key)),
        SagaStatus::InFlight | SagaStatus::Failed => Ok(Claim::Resume {
            last_step: record.last_step,
            target_id: record.target_id,
            token: ClaimToken {
                key: record.key,
                generation: record.generation + 1,
            },
        }),
    }
}

/// Ownership check shared by every update.
fn check_owner(record: &SagaRecord, token: ClaimToken) -> Result<(), SagaLogError> {
    if record.generation != token.generation {
        return Err(SagaLogError::Superseded(token.key));
    }
    if record.status != SagaStatus::InFlight {
        return Err(SagaLogError::NotClaimed(token.key));
    }
    Ok(())
}
