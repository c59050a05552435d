//! Startup wiring: backends, schema migration and the target capability probe.
//!
//! Everything here runs once, before the listener accepts requests.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use ledgerbridge_core::{StoreName, UserId};
use ledgerbridge_infra::{
    ConfigError, ErpStore, InMemorySagaLog, MigrationReport, PostgresSagaLog, SagaLog, SagaLogError,
    SchemaError, SchemaMigrator, SessionContext, StoreError, SyncConfig,
};
use ledgerbridge_sync::{SyncService, TargetCapabilities};

/// User recorded on startup work (capability probe).
pub const SYSTEM_USER: UserId = UserId::new(1);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("store {actual} was wired where {expected} is configured")]
    StoreMismatch { expected: StoreName, actual: StoreName },

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("saga log unavailable: {0}")]
    SagaLog(#[from] SagaLogError),

    #[error("target capability probe failed: {0}")]
    Probe(#[from] StoreError),
}

/// Bridge-owned persistence. The schema migration never runs here; it runs
/// against the target store's own catalog.
#[derive(Clone)]
pub struct Backends {
    pub saga: Arc<dyn SagaLog>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            saga: Arc::new(InMemorySagaLog::new()),
        }
    }

    pub async fn postgres(database_url: &str) -> Result<Self, StartupError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let saga = PostgresSagaLog::new(pool);
        saga.ensure_table().await?;

        Ok(Self { saga: Arc::new(saga) })
    }

    pub async fn from_config(config: &SyncConfig) -> Result<Self, StartupError> {
        match config.database_url.as_deref() {
            Some(url) => {
                tracing::info!("using Postgres saga log");
                Self::postgres(url).await
            }
            None => {
                tracing::warn!("DATABASE_URL not set; saga log is in memory");
                Ok(Self::in_memory())
            }
        }
    }
}

pub struct AppServices {
    pub sync: SyncService,
    pub migration: MigrationReport,
}

impl AppServices {
    /// Run the startup migration and capability probe, then build the sync service.
    ///
    /// Blocking: with Postgres backends this must run off the async workers
    /// (`tokio::task::spawn_blocking`).
    pub fn bootstrap(
        config: &SyncConfig,
        primary: Arc<dyn ErpStore>,
        target: Arc<dyn ErpStore>,
        backends: Backends,
    ) -> Result<Self, StartupError> {
        config.validate()?;
        ensure_named(&config.primary_store, &*primary)?;
        ensure_named(&config.target_store, &*target)?;

        let migration = SchemaMigrator::run(target.schema_catalog(), &config.schema_columns)?;
        tracing::info!(
            store = %target.name(),
            added = migration.added.len(),
            already_present = migration.already_present.len(),
            "schema migration finished"
        );

        let capabilities =
            TargetCapabilities::probe(&*target, SessionContext::new(target.name().clone(), SYSTEM_USER))?;

        let sync = SyncService::new(primary, target, backends.saga, capabilities, config);
        Ok(Self { sync, migration })
    }
}

fn ensure_named(expected: &StoreName, store: &dyn ErpStore) -> Result<(), StartupError> {
    if store.name() == expected {
        return Ok(());
    }
    Err(StartupError::StoreMismatch {
        expected: expected.clone(),
        actual: store.name().clone(),
    })
}
