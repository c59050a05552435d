//! Target-store schema evolution.
//!
//! Columns the replication depends on are checked and, when absent, added once
//! at startup. Existing columns are never dropped or altered. Each store
//! exposes its own catalog through [`crate::ErpStore::schema_catalog`].

use std::sync::Arc;

use thiserror::Error;

use crate::config::ColumnSpec;

const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid column definition: {0:?}")]
    InvalidDefinition(String),

    #[error("schema backend error: {0}")]
    Backend(String),
}

/// Live schema metadata of one store.
pub trait SchemaCatalog: Send + Sync {
    fn column_exists(&self, table: &str, column: &str) -> Result<bool, SchemaError>;

    /// Add a column. Implementations must not touch an existing column.
    fn add_column(&self, spec: &ColumnSpec) -> Result<(), SchemaError>;
}

impl<S> SchemaCatalog for Arc<S>
where
    S: SchemaCatalog + ?Sized,
{
    fn column_exists(&self, table: &str, column: &str) -> Result<bool, SchemaError> {
        (**self).column_exists(table, column)
    }

    fn add_column(&self, spec: &ColumnSpec) -> Result<(), SchemaError> {
        (**self).add_column(spec)
    }
}

/// Plain SQL identifier: letters, digits and underscores, not starting with a digit.
pub fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && name.len() <= MAX_IDENTIFIER_LEN
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

/// Rejects definitions that could smuggle a second statement or a comment.
pub fn validate_definition(definition: &str) -> Result<(), SchemaError> {
    let trimmed = definition.trim();
    if trimmed.is_empty() || trimmed.contains(';') || trimmed.contains("--") || trimmed.contains("/*") {
        return Err(SchemaError::InvalidDefinition(definition.to_string()));
    }
    Ok(())
}

pub fn validate_spec(spec: &ColumnSpec) -> Result<(), SchemaError> {
    validate_identifier(&spec.table)?;
    validate_identifier(&spec.column)?;
    validate_definition(&spec.definition)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub added: Vec<ColumnSpec>,
    pub already_present: Vec<ColumnSpec>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
    }
}

/// Startup migration step.
pub struct SchemaMigrator;

impl SchemaMigrator {
    /// Ensure every column exists. All specs are validated before anything is written.
    pub fn run<C>(catalog: &C, columns: &[ColumnSpec]) -> Result<MigrationReport, SchemaError>
    where
        C: SchemaCatalog + ?Sized,
    {
        for spec in columns {
            validate_spec(spec)?;
        }

        let mut report = MigrationReport::default();
        for spec in columns {
            if catalog.column_exists(&spec.table, &spec.column)? {
                tracing::debug!(column = %spec, "column present");
                report.already_present.push(spec.clone());
                continue;
            }
            catalog.add_column(spec)?;
            tracing::info!(column = %spec, "column added");
            report.added.push(spec.clone());
        }
        Ok(report)
    }
}
