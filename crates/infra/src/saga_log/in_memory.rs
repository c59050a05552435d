use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};

use super::{
    Claim, ClaimToken, DEFAULT_LEASE_MINUTES, IdempotencyKey, SagaLog, SagaLogError, SagaRecord, SagaStatus,
    SagaStep, check_owner, evaluate_existing, fresh_claim,
};

/// In-memory saga log (single process).
#[derive(Debug)]
pub struct InMemorySagaLog {
    records: RwLock<HashMap<IdempotencyKey, SagaRecord>>,
    lease: Duration,
}

impl Default for InMemorySagaLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySagaLog {
    pub fn new() -> Self {
        Self::with_lease(Duration::minutes(DEFAULT_LEASE_MINUTES))
    }

    pub fn with_lease(lease: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            lease,
        }
    }

    fn update<T>(
        &self,
        token: ClaimToken,
        f: impl FnOnce(&mut SagaRecord) -> Result<T, SagaLogError>,
    ) -> Result<T, SagaLogError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SagaLogError::Backend("lock poisoned".to_string()))?;
        let record = records
            .get_mut(&token.key())
            .ok_or(SagaLogError::NotClaimed(token.key()))?;
        check_owner(record, token)?;
        let out = f(record)?;
        record.updated_at = Utc::now();
        Ok(out)
    }
}

impl SagaLog for InMemorySagaLog {
    fn claim(&self, key: IdempotencyKey) -> Result<Claim, SagaLogError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SagaLogError::Backend("lock poisoned".to_string()))?;
        let now = Utc::now();

        if !records.contains_key(&key) {
            records.insert(
                key,
                SagaRecord {
                    key,
                    status: SagaStatus::InFlight,
                    last_step: None,
                    target_id: None,
                    failure: None,
                    generation: 1,
                    updated_at: now,
                },
            );
            return Ok(fresh_claim(key));
        }
        let record = records.get_mut(&key).ok_or(SagaLogError::NotClaimed(key))?;

        let claim = evaluate_existing(record, now, self.lease)?;
        if let Claim::Resume { token, .. } = claim {
            record.generation = token.generation();
            record.status = SagaStatus::InFlight;
            record.failure = None;
            record.updated_at = now;
        }
        Ok(claim)
    }

    fn record(&self, token: ClaimToken, step: SagaStep) -> Result<(), SagaLogError> {
        self.update(token, |record| {
            record.last_step = Some(step);
            if let Some(target_id) = step.target_id() {
                record.target_id = Some(target_id);
            }
            Ok(())
        })
    }

    fn complete(&self, token: ClaimToken, target_id: u64) -> Result<(), SagaLogError> {
        self.update(token, |record| {
            record.status = SagaStatus::Completed;
            record.target_id = Some(target_id);
            Ok(())
        })
    }

    fn fail(&self, token: ClaimToken, reason: &str) -> Result<(), SagaLogError> {
        self.update(token, |record| {
            record.status = SagaStatus::Failed;
            record.failure = Some(reason.to_string());
            Ok(())
        })
    }

    fn get(&self, key: IdempotencyKey) -> Result<Option<SagaRecord>, SagaLogError> {
        let records = self
            .records
            .read()
            .map_err(|_| SagaLogError::Backend("lock poisoned".to_string()))?;
        Ok(records.get(&key).cloned())
    }
}
