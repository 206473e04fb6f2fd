//! Schema diff engine
//!
//! Compares the target model definitions against the live schema and plans
//! the SQL needed to reconcile them. The comparison result is the
//! [`DiffSignal`] sum type returned by value; "changes detected" is a data
//! value here, never a control-flow exception.

use crate::schema::{ColumnDef, TableDef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of comparing live schema state to target model definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "description")]
pub enum DiffSignal {
    /// Live schema and target definitions agree.
    NoChange,
    /// Pending, unauthored schema changes; carries a human-readable summary.
    Changes(String),
}

/// Executable forward/reverse migration steps for one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationScript {
    pub up_sql: String,
    pub down_sql: String,
}

/// A planned reconciliation: what changed, and the script realizing it.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub description: String,
    pub script: MigrationScript,
}

/// The diff engine comparing target definitions to the live schema
pub struct DiffEngine;

impl DiffEngine {
    /// Compare target model definitions against the live schema.
    pub fn compare(target: &[TableDef], live: &[TableDef]) -> DiffSignal {
        match Self::plan(target, live) {
            None => DiffSignal::NoChange,
            Some(planned) => DiffSignal::Changes(planned.description),
        }
    }

    /// Plan the migration that transforms the live schema into the target.
    /// Returns `None` when both already agree.
    pub fn plan(target: &[TableDef], live: &[TableDef]) -> Option<PlannedChange> {
        let live_map: HashMap<String, &TableDef> =
            live.iter().map(|t| (t.qualified_name(), t)).collect();
        let target_map: HashMap<String, &TableDef> =
            target.iter().map(|t| (t.qualified_name(), t)).collect();

        let mut descriptions = Vec::new();
        let mut up_statements = Vec::new();
        let mut down_statements = Vec::new();

        // Tables to create (in target, missing live)
        let mut added: Vec<&TableDef> = target
            .iter()
            .filter(|t| !live_map.contains_key(&t.qualified_name()))
            .collect();
        added.sort_by_key(|t| t.qualified_name());

        for table in added {
            descriptions.push(format!(
                "Table {} created with {} columns",
                table.qualified_name(),
                table.columns.len()
            ));
            up_statements.push(Self::create_table_sql(table));
            down_statements.push(format!(
                "DROP TABLE IF EXISTS \"{}\".\"{}\" CASCADE;",
                table.schema, table.name
            ));
        }

        // Tables to drop (live, absent from target)
        let mut removed: Vec<&TableDef> = live
            .iter()
            .filter(|t| !target_map.contains_key(&t.qualified_name()))
            .collect();
        removed.sort_by_key(|t| t.qualified_name());

        for table in removed {
            descriptions.push(format!("Table {} dropped", table.qualified_name()));
            up_statements.push(format!(
                "DROP TABLE \"{}\".\"{}\" CASCADE;",
                table.schema, table.name
            ));
            // Recreating the dropped table is the reverse of dropping it.
            down_statements.push(Self::create_table_sql(table));
        }

        // Tables present on both sides: diff columns
        let mut shared: Vec<&String> = target_map
            .keys()
            .filter(|k| live_map.contains_key(*k))
            .collect();
        shared.sort();

        for key in shared {
            let target_table = target_map[key];
            let live_table = live_map[key];
            Self::diff_columns(
                target_table,
                live_table,
                &mut descriptions,
                &mut up_statements,
                &mut down_statements,
            );
        }

        if up_statements.is_empty() {
            return None;
        }

        // Reverse steps undo the forward steps in reverse order.
        down_statements.reverse();

        Some(PlannedChange {
            description: descriptions.join("; "),
            script: MigrationScript {
                up_sql: up_statements.join("\n\n"),
                down_sql: down_statements.join("\n\n"),
            },
        })
    }

    fn diff_columns(
        target: &TableDef,
        live: &TableDef,
        descriptions: &mut Vec<String>,
        up_statements: &mut Vec<String>,
        down_statements: &mut Vec<String>,
    ) {
        let table_path = target.qualified_name();

        let live_cols: HashMap<&str, &ColumnDef> =
            live.columns.iter().map(|c| (c.name.as_str(), c)).collect();
        let target_cols: HashMap<&str, &ColumnDef> = target
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();

        // Added columns
        for col in &target.columns {
            if live_cols.contains_key(col.name.as_str()) {
                continue;
            }
            descriptions.push(format!(
                "Column {}.{} added (type: {}, nullable: {})",
                table_path, col.name, col.data_type, col.nullable
            ));
            up_statements.push(Self::add_column_sql(target, col));
            down_statements.push(format!(
                "ALTER TABLE \"{}\".\"{}\" DROP COLUMN IF EXISTS \"{}\";",
                target.schema, target.name, col.name
            ));
        }

        // Removed columns
        let mut dropped: Vec<&ColumnDef> = live
            .columns
            .iter()
            .filter(|c| !target_cols.contains_key(c.name.as_str()))
            .collect();
        dropped.sort_by(|a, b| a.name.cmp(&b.name));

        for col in dropped {
            descriptions.push(format!(
                "Column {}.{} dropped (type: {})",
                table_path, col.name, col.data_type
            ));
            up_statements.push(format!(
                "ALTER TABLE \"{}\".\"{}\" DROP COLUMN \"{}\";",
                live.schema, live.name, col.name
            ));
            down_statements.push(Self::add_column_sql(live, col));
        }

        // Modified columns (type or nullability drift)
        for col in &target.columns {
            let Some(live_col) = live_cols.get(col.name.as_str()) else {
                continue;
            };
            if live_col.data_type == col.data_type && live_col.nullable == col.nullable {
                continue;
            }
            descriptions.push(format!(
                "Column {}.{} modified (type: {} -> {}, nullable: {} -> {})",
                table_path,
                col.name,
                live_col.data_type,
                col.data_type,
                live_col.nullable,
                col.nullable
            ));
            up_statements.push(Self::alter_column_sql(target, live_col, col));
            down_statements.push(Self::alter_column_sql(target, col, live_col));
        }
    }

    fn create_table_sql(table: &TableDef) -> String {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|col| {
                let mut def = format!("    \"{}\" {}", col.name, col.data_type);
                if !col.nullable {
                    def.push_str(" NOT NULL");
                }
                if let Some(ref default) = col.default_value {
                    def.push_str(&format!(" DEFAULT {}", default));
                }
                def
            })
            .collect();

        let pk_cols: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| format!("\"{}\"", c.name))
            .collect();

        let mut sql = format!(
            "CREATE TABLE \"{}\".\"{}\" (\n{}",
            table.schema,
            table.name,
            columns.join(",\n")
        );

        if !pk_cols.is_empty() {
            sql.push_str(&format!(",\n    PRIMARY KEY ({})", pk_cols.join(", ")));
        }

        sql.push_str("\n);");
        sql
    }

    fn add_column_sql(table: &TableDef, col: &ColumnDef) -> String {
        let mut sql = format!(
            "ALTER TABLE \"{}\".\"{}\" ADD COLUMN \"{}\" {}",
            table.schema, table.name, col.name, col.data_type
        );

        if !col.nullable {
            sql.push_str(" NOT NULL");
        }

        if let Some(ref default) = col.default_value {
            sql.push_str(&format!(" DEFAULT {}", default));
        }

        sql.push(';');
        sql
    }

    fn alter_column_sql(table: &TableDef, from: &ColumnDef, to: &ColumnDef) -> String {
        let mut statements = Vec::new();

        if from.data_type != to.data_type {
            statements.push(format!(
                "ALTER TABLE \"{}\".\"{}\" ALTER COLUMN \"{}\" TYPE {} USING \"{}\"::{};",
                table.schema, table.name, to.name, to.data_type, to.name, to.data_type
            ));
        }

        if from.nullable != to.nullable {
            if to.nullable {
                statements.push(format!(
                    "ALTER TABLE \"{}\".\"{}\" ALTER COLUMN \"{}\" DROP NOT NULL;",
                    table.schema, table.name, to.name
                ));
            } else {
                statements.push(format!(
                    "ALTER TABLE \"{}\".\"{}\" ALTER COLUMN \"{}\" SET NOT NULL;",
                    table.schema, table.name, to.name
                ));
            }
        }

        statements.join("\n")
    }
}
