//! Schema model
//!
//! Shared table/column definitions used both for target models (what the
//! code declares) and for live schema snapshots (what the database has).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
}

/// A table definition: the unit both the model registry and the live
/// snapshot speak in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

fn default_schema() -> String {
    "public".to_string()
}

impl TableDef {
    /// Full path to the table (e.g., "public.users")
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Point-in-time capture of the live database schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSchema {
    pub captured_at: DateTime<Utc>,
    pub tables: Vec<TableDef>,
    pub checksum: String,
}

impl LiveSchema {
    pub fn new(tables: Vec<TableDef>) -> Self {
        let checksum = schema_checksum(&tables);
        Self {
            captured_at: Utc::now(),
            tables,
            checksum,
        }
    }
}

/// Compute a content checksum over a set of table definitions.
///
/// Tables and columns are hashed in sorted order so two structurally equal
/// schemas always produce the same fingerprint regardless of listing order.
pub fn schema_checksum(tables: &[TableDef]) -> String {
    let mut hasher = Sha256::new();

    let mut entries: Vec<String> = tables
        .iter()
        .flat_map(|t| {
            let path = t.qualified_name();
            std::iter::once(path.clone()).chain(t.columns.iter().map(move |c| {
                format!(
                    "{}.{}:{}:{}:{}:{}",
                    path,
                    c.name,
                    c.data_type,
                    c.nullable,
                    c.default_value.as_deref().unwrap_or(""),
                    c.primary_key
                )
            }))
        })
        .collect();
    entries.sort();

    for entry in &entries {
        hasher.update(entry.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}
