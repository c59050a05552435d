//! Infrastructure layer: store boundary, schema migration, saga log, config.

pub mod config;
pub mod saga_log;
pub mod schema;
pub mod session;
pub mod store;

pub use config::{ColumnSpec, ConfigError, SyncConfig};
pub use session::{PartitionScope, SessionContext};
pub use store::{ErpStore, InMemoryErpStore, Note, Operation, StoreError, StoreSession};
pub use saga_log::{
    Claim, ClaimToken, IdempotencyKey, InMemorySagaLog, PostgresSagaLog, SagaKind, SagaLog, SagaLogError, SagaRecord,
    SagaStatus, SagaStep,
};
pub use schema::{MigrationReport, SchemaCatalog, SchemaError, SchemaMigrator};
