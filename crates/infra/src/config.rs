//! Runtime configuration.
//!
//! Values come from `LEDGERBRIDGE_*` environment variables; anything unset falls
//! back to the defaults below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerbridge_core::{JournalId, StoreName};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid {expected}: {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("primary and target store must differ (both are {0})")]
    SameStore(StoreName),

    #[error("{0} must be a non-zero journal id")]
    ZeroJournal(&'static str),
}

/// A column the target store must define, added at startup when missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub table: String,
    pub column: String,
    /// SQL type and default, e.g. `INTEGER DEFAULT 0`.
    pub definition: String,
}

impl ColumnSpec {
    pub fn new(table: impl Into<String>, column: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            definition: definition.into(),
        }
    }

    /// Parse `table.column SQL definition`, as used by `LEDGERBRIDGE_SCHEMA_COLUMNS`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (qualified, definition) = raw.trim().split_once(char::is_whitespace)?;
        let (table, column) = qualified.split_once('.')?;
        let definition = definition.trim();
        if table.is_empty() || column.is_empty() || definition.is_empty() {
            return None;
        }
        Some(Self::new(table, column, definition))
    }
}

impl core::fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{} {}", self.table, self.column, self.definition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub primary_store: StoreName,
    pub target_store: StoreName,
    /// Journal forced onto source invoices before they are posted.
    pub confirmation_journal_id: JournalId,
    /// Target journal payments are registered in.
    pub payment_journal_id: JournalId,
    pub schema_columns: Vec<ColumnSpec>,
    pub listen_addr: String,
    pub database_url: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            primary_store: StoreName::from_static("PICCOLO"),
            target_store: StoreName::from_static("PICCOLO_COMMUNITY"),
            confirmation_journal_id: JournalId::new(50),
            payment_journal_id: JournalId::new(14),
            schema_columns: vec![ColumnSpec::new("account_move", "delivery_count", "INTEGER DEFAULT 0")],
            listen_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            primary_store: store_var(&lookup, "LEDGERBRIDGE_PRIMARY_STORE", defaults.primary_store)?,
            target_store: store_var(&lookup, "LEDGERBRIDGE_TARGET_STORE", defaults.target_store)?,
            confirmation_journal_id: parsed_var(
                &lookup,
                "LEDGERBRIDGE_CONFIRMATION_JOURNAL_ID",
                defaults.confirmation_journal_id,
            )?,
            payment_journal_id: parsed_var(&lookup, "LEDGERBRIDGE_PAYMENT_JOURNAL_ID", defaults.payment_journal_id)?,
            schema_columns: match lookup("LEDGERBRIDGE_SCHEMA_COLUMNS") {
                Some(raw) => raw
                    .split(';')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| {
                        ColumnSpec::parse(s).ok_or_else(|| ConfigError::Invalid {
                            var: "LEDGERBRIDGE_SCHEMA_COLUMNS",
                            expected: "`table.column definition` list",
                            value: s.to_string(),
                        })
                    })
                    .collect::<Result<_, _>>()?,
                None => defaults.schema_columns,
            },
            listen_addr: lookup("LEDGERBRIDGE_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_store == self.target_store {
            return Err(ConfigError::SameStore(self.primary_store.clone()));
        }
        if self.confirmation_journal_id.get() == 0 {
            return Err(ConfigError::ZeroJournal("confirmation_journal_id"));
        }
        if self.payment_journal_id.get() == 0 {
            return Err(ConfigError::ZeroJournal("payment_journal_id"));
        }
        Ok(())
    }
}

fn store_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: StoreName,
) -> Result<StoreName, ConfigError> {
    match lookup(var) {
        Some(raw) => StoreName::new(&raw).map_err(|_| ConfigError::Invalid {
            var,
            expected: "store name",
            value: raw,
        }),
        None => {
            tracing::warn!(var, default = %default, "store name not set; using default");
            Ok(default)
        }
    }
}

fn parsed_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: JournalId,
) -> Result<JournalId, ConfigError> {
    match lookup(var) {
        Some(raw) => raw.trim().parse::<u64>().map(JournalId::new).map_err(|_| ConfigError::Invalid {
            var,
            expected: "journal id",
            value: raw,
        }),
        None => {
            tracing::warn!(var, default = %default, "journal id not set; using default");
            Ok(default)
        }
    }
}
