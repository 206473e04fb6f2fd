//! Model registry
//!
//! Holds the target table definitions the schema is diffed against.
//! Registration is explicit and validated up front: a malformed definition
//! fails with a configuration error at registration time, never through a
//! hidden hook later in the pipeline.

use crate::config::MigrationConfig;
use crate::error::{config_error, MigrateResult};
use crate::schema::TableDef;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Registered target model definitions; consumed, not owned, by the
/// migration core.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    tables: Vec<TableDef>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Load every schema-defining declaration named by the configuration.
    /// Must run before any diff so all target tables are visible.
    pub fn load_modules(config: &MigrationConfig) -> MigrateResult<Self> {
        Self::builder()
            .load_manifest(&config.models_manifest)?
            .build()
    }

    pub fn table_defs(&self) -> &[TableDef] {
        &self.tables
    }
}

/// Builder enforcing the registration contract: non-empty table name, at
/// least one column, no duplicate registrations.
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    tables: Vec<TableDef>,
    seen: HashSet<String>,
}

impl ModelRegistryBuilder {
    pub fn register(mut self, table: TableDef) -> MigrateResult<Self> {
        if table.name.trim().is_empty() {
            return Err(config_error("model registered with an empty table name"));
        }
        if table.columns.is_empty() {
            return Err(config_error(format!(
                "model {} registered with no columns",
                table.qualified_name()
            )));
        }
        if !self.seen.insert(table.qualified_name()) {
            return Err(config_error(format!(
                "model {} registered twice",
                table.qualified_name()
            )));
        }
        self.tables.push(table);
        Ok(self)
    }

    /// Register every table in a declarative JSON manifest.
    pub fn load_manifest(mut self, path: &Path) -> MigrateResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            config_error(format!(
                "failed to read model manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        let tables: Vec<TableDef> = serde_json::from_str(&raw)?;
        debug!(
            "Loaded {} model definitions from {}",
            tables.len(),
            path.display()
        );
        for table in tables {
            self = self.register(table)?;
        }
        Ok(self)
    }

    pub fn build(self) -> MigrateResult<ModelRegistry> {
        Ok(ModelRegistry {
            tables: self.tables,
        })
    }
}
