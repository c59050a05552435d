//! Postgres-backed saga log.
//!
//! One row per idempotency key in `sync_sagas`. A claim inserts the row with
//! `ON CONFLICT DO NOTHING`; when the row already exists it is locked with
//! `SELECT .. FOR UPDATE` and evaluated inside the same transaction, so two
//! processes racing on one key cannot both win. Updates match on the claim's
//! `generation` as well as the key.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::{
    Claim, ClaimToken, DEFAULT_LEASE_MINUTES, IdempotencyKey, SagaLog, SagaLogError, SagaRecord, SagaStatus,
    SagaStep, check_owner, evaluate_existing, fresh_claim,
};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sync_sagas (
    key         UUID PRIMARY KEY,
    kind        TEXT NOT NULL,
    status      TEXT NOT NULL,
    last_step   JSONB,
    target_id   BIGINT,
    failure     TEXT,
    generation  BIGINT NOT NULL DEFAULT 1,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const ADD_GENERATION: &str =
    "ALTER TABLE sync_sagas ADD COLUMN IF NOT EXISTS generation BIGINT NOT NULL DEFAULT 1";

#[derive(Debug, Clone)]
pub struct PostgresSagaLog {
    pool: Arc<PgPool>,
    lease: Duration,
}

impl PostgresSagaLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            lease: Duration::minutes(DEFAULT_LEASE_MINUTES),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Create the backing table if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_table(&self) -> Result<(), SagaLogError> {
        for statement in [CREATE_TABLE, ADD_GENERATION] {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_table", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, key), fields(key = %key), err)]
    pub async fn claim_async(&self, key: IdempotencyKey) -> Result<Claim, SagaLogError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("claim", e))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO sync_sagas (key, kind, status, generation, updated_at)
            VALUES ($1, $2, $3, 1, now())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key.as_uuid())
        .bind(key.kind().as_str())
        .bind(SagaStatus::InFlight.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("claim", e))?;

        if inserted.rows_affected() == 1 {
            tx.commit().await.map_err(|e| map_sqlx_error("claim", e))?;
            return Ok(fresh_claim(key));
        }

        let row = sqlx::query(
            r#"
            SELECT status, last_step, target_id, failure, generation, updated_at
            FROM sync_sagas
            WHERE key = $1
            FOR UPDATE
            "#,
        )
        .bind(key.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("claim", e))?;
        let record = record_from_row(key, &row)?;

        let claim = evaluate_existing(&record, Utc::now(), self.lease)?;
        if let Claim::Resume { token, .. } = claim {
            sqlx::query(
                r#"
                UPDATE sync_sagas
                SET status = $2, failure = NULL, generation = $3, updated_at = now()
                WHERE key = $1
                "#,
            )
            .bind(key.as_uuid())
            .bind(SagaStatus::InFlight.as_str())
            .bind(to_db_generation(token)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("claim", e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("claim", e))?;
        Ok(claim)
    }

    #[instrument(skip(self, token), fields(claim = %token), err)]
    pub async fn record_async(&self, token: ClaimToken, step: SagaStep) -> Result<(), SagaLogError> {
        let step_json = serde_json::to_value(step).map_err(|e| SagaLogError::Backend(e.to_string()))?;
        let target = step.target_id().map(to_db_id).transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE sync_sagas
            SET last_step = $2, target_id = COALESCE($3, target_id), updated_at = now()
            WHERE key = $1 AND status = 'in_flight' AND generation = $4
            "#,
        )
        .bind(token.key().as_uuid())
        .bind(step_json)
        .bind(target)
        .bind(to_db_generation(token)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record", e))?;
        self.require_owner(token, result.rows_affected()).await
    }

    #[instrument(skip(self, token), fields(claim = %token), err)]
    pub async fn complete_async(&self, token: ClaimToken, target_id: u64) -> Result<(), SagaLogError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_sagas
            SET status = 'completed', target_id = $2, updated_at = now()
            WHERE key = $1 AND status = 'in_flight' AND generation = $3
            "#,
        )
        .bind(token.key().as_uuid())
        .bind(to_db_id(target_id)?)
        .bind(to_db_generation(token)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("complete", e))?;
        self.require_owner(token, result.rows_affected()).await
    }

    #[instrument(skip(self, token), fields(claim = %token), err)]
    pub async fn fail_async(&self, token: ClaimToken, reason: &str) -> Result<(), SagaLogError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_sagas
            SET status = 'failed', failure = $2, updated_at = now()
            WHERE key = $1 AND status = 'in_flight' AND generation = $3
            "#,
        )
        .bind(token.key().as_uuid())
        .bind(reason)
        .bind(to_db_generation(token)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fail", e))?;
        self.require_owner(token, result.rows_affected()).await
    }

    /// An update that matched no row is explained by re-reading the record.
    async fn require_owner(&self, token: ClaimToken, rows: u64) -> Result<(), SagaLogError> {
        if rows == 1 {
            return Ok(());
        }
        match self.get_async(token.key()).await? {
            Some(record) => check_owner(&record, token).and(Err(SagaLogError::NotClaimed(token.key()))),
            None => Err(SagaLogError::NotClaimed(token.key())),
        }
    }

    #[instrument(skip(self, key), fields(key = %key), err)]
    pub async fn get_async(&self, key: IdempotencyKey) -> Result<Option<SagaRecord>, SagaLogError> {
        let row = sqlx::query(
            r#"
            SELECT status, last_step, target_id, failure, generation, updated_at
            FROM sync_sagas
            WHERE key = $1
            "#,
        )
        .bind(key.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;
        row.map(|row| record_from_row(key, &row)).transpose()
    }
}

fn record_from_row(key: IdempotencyKey, row: &sqlx::postgres::PgRow) -> Result<SagaRecord, SagaLogError> {
    let status: String = row.try_get("status").map_err(|e| map_sqlx_error("decode", e))?;
    let status = SagaStatus::parse(&status)
        .ok_or_else(|| SagaLogError::Corrupt(key, format!("unknown status {status:?}")))?;
    let last_step: Option<serde_json::Value> = row.try_get("last_step").map_err(|e| map_sqlx_error("decode", e))?;
    let last_step = last_step
        .map(serde_json::from_value::<SagaStep>)
        .transpose()
        .map_err(|e| SagaLogError::Corrupt(key, e.to_string()))?;
    let target_id: Option<i64> = row.try_get("target_id").map_err(|e| map_sqlx_error("decode", e))?;
    let target_id = target_id
        .map(|id| u64::try_from(id).map_err(|_| SagaLogError::Corrupt(key, format!("negative target id {id}"))))
        .transpose()?;
    let failure: Option<String> = row.try_get("failure").map_err(|e| map_sqlx_error("decode", e))?;
    let generation: i64 = row.try_get("generation").map_err(|e| map_sqlx_error("decode", e))?;
    let generation = u64::try_from(generation)
        .map_err(|_| SagaLogError::Corrupt(key, format!("negative generation {generation}")))?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(|e| map_sqlx_error("decode", e))?;

    Ok(SagaRecord {
        key,
        status,
        last_step,
        target_id,
        failure,
        generation,
        updated_at,
    })
}

fn to_db_id(id: u64) -> Result<i64, SagaLogError> {
    i64::try_from(id).map_err(|_| SagaLogError::Backend(format!("target id {id} out of range")))
}

fn to_db_generation(token: ClaimToken) -> Result<i64, SagaLogError> {
    i64::try_from(token.generation())
        .map_err(|_| SagaLogError::Corrupt(token.key(), format!("generation {} out of range", token.generation())))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SagaLogError {
    match err {
        sqlx::Error::Database(db_err) => {
            SagaLogError::Backend(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::RowNotFound => SagaLogError::Backend(format!("row vanished during {operation}")),
        sqlx::Error::PoolClosed => SagaLogError::Backend(format!("connection pool closed during {operation}")),
        other => SagaLogError::Backend(format!("error in {operation}: {other}")),
    }
}

fn runtime() -> Result<tokio::runtime::Handle, SagaLogError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        SagaLogError::Backend("PostgresSagaLog requires a tokio runtime; call it from a blocking task".to_string())
    })
}

impl SagaLog for PostgresSagaLog {
    fn claim(&self, key: IdempotencyKey) -> Result<Claim, SagaLogError> {
        runtime()?.block_on(self.claim_async(key))
    }

    fn record(&self, token: ClaimToken, step: SagaStep) -> Result<(), SagaLogError> {
        runtime()?.block_on(self.record_async(token, step))
    }

    fn complete(&self, token: ClaimToken, target_id: u64) -> Result<(), SagaLogError> {
        runtime()?.block_on(self.complete_async(token, target_id))
    }

    fn fail(&self, token: ClaimToken, reason: &str) -> Result<(), SagaLogError> {
        runtime()?.block_on(self.fail_async(token, reason))
    }

    fn get(&self, key: IdempotencyKey) -> Result<Option<SagaRecord>, SagaLogError> {
        runtime()?.block_on(self.get_async(key))
    }
}
