//! Postgres schema backend
//!
//! Connection pooling and the production [`SchemaBackend`] implementation:
//! runs revision scripts, keeps the current-revision marker in a single-row
//! table, and introspects the live schema from information_schema.

use crate::backend::SchemaBackend;
use crate::config::DatabaseConfig;
use crate::error::{config_error, corruption_error, MigrateResult};
use crate::revision::RevisionId;
use crate::schema::{ColumnDef, LiveSchema, TableDef};
use async_trait::async_trait;
use deadpool_postgres::{Client, Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::collections::BTreeMap;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Single-row table holding the id of the last revision applied.
const MARKER_TABLE: &str = "revflow_marker";

pub struct PgBackend {
    pool: Pool,
    /// Optional schema scope: applied as `search_path` on every acquired
    /// client for the duration of the command.
    schema_scope: Option<String>,
}

impl PgBackend {
    /// Create the pool, verify connectivity, and make sure the marker
    /// table exists.
    pub async fn connect(config: &DatabaseConfig) -> MigrateResult<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.dbname = Some(config.database.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| config_error(format!("Failed to create pool: {}", e)))?;

        let client = pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (revision TEXT NOT NULL)",
            MARKER_TABLE
        );
        client.execute(ddl.as_str(), &[]).await?;
        drop(client);

        info!("Database connection pool established");

        Ok(Self {
            pool,
            schema_scope: None,
        })
    }

    /// Scope every script and query to a named schema via `search_path`.
    pub fn with_schema_scope(mut self, schema: &str) -> Self {
        if !schema.is_empty() {
            self.schema_scope = Some(schema.to_string());
        }
        self
    }

    async fn client(&self) -> MigrateResult<Client> {
        let client = self.pool.get().await?;
        if let Some(ref schema) = self.schema_scope {
            client
                .batch_execute(&format!("SET search_path TO \"{}\", public", schema))
                .await?;
        }
        Ok(client)
    }
}

#[async_trait]
impl SchemaBackend for PgBackend {
    async fn current_marker(&self) -> MigrateResult<Option<RevisionId>> {
        let client = self.client().await?;
        let select = format!("SELECT revision FROM {} LIMIT 1", MARKER_TABLE);
        let rows = client.query(select.as_str(), &[]).await?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let raw: String = row.get("revision");
        let id = raw.parse::<RevisionId>().map_err(|_| {
            corruption_error(format!(
                "current revision marker holds an unparseable id: {:?}",
                raw
            ))
        })?;
        Ok(Some(id))
    }

    async fn set_marker(&self, marker: Option<&RevisionId>) -> MigrateResult<()> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        let clear = format!("DELETE FROM {}", MARKER_TABLE);
        tx.execute(clear.as_str(), &[]).await?;
        if let Some(id) = marker {
            let insert = format!("INSERT INTO {} (revision) VALUES ($1)", MARKER_TABLE);
            tx.execute(insert.as_str(), &[&id.to_string()]).await?;
        }
        tx.commit().await?;
        debug!("Current revision marker set to {:?}", marker.map(|m| m.short()));
        Ok(())
    }

    async fn run_script(&self, sql: &str) -> MigrateResult<()> {
        let mut client = self.client().await?;
        // One revision script runs as a unit; a failed statement leaves
        // the schema as it was before this revision.
        let tx = client.transaction().await?;
        tx.batch_execute(sql).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn snapshot(&self) -> MigrateResult<LiveSchema> {
        let client = self.client().await?;

        let query = r#"
            SELECT
                c.table_schema,
                c.table_name,
                c.column_name,
                c.data_type,
                c.is_nullable,
                c.column_default,
                c.ordinal_position,
                COALESCE(
                    (SELECT true FROM information_schema.table_constraints tc
                     JOIN information_schema.key_column_usage kcu
                        ON tc.constraint_name = kcu.constraint_name
                        AND tc.table_schema = kcu.table_schema
                     WHERE tc.constraint_type = 'PRIMARY KEY'
                        AND tc.table_schema = c.table_schema
                        AND tc.table_name = c.table_name
                        AND kcu.column_name = c.column_name
                     LIMIT 1),
                    false
                ) AS is_primary_key
            FROM information_schema.columns c
            JOIN information_schema.tables t
                ON t.table_schema = c.table_schema
                AND t.table_name = c.table_name
            WHERE c.table_schema NOT IN ('pg_catalog', 'information_schema')
              AND t.table_type = 'BASE TABLE'
              AND c.table_name <> $1
            ORDER BY c.table_schema, c.table_name, c.ordinal_position
        "#;

        let rows = client.query(query, &[&MARKER_TABLE]).await?;

        let mut tables: BTreeMap<(String, String), Vec<ColumnDef>> = BTreeMap::new();
        for row in rows {
            let schema: String = row.get("table_schema");
            let name: String = row.get("table_name");
            tables
                .entry((schema, name))
                .or_default()
                .push(ColumnDef {
                    name: row.get("column_name"),
                    data_type: row.get("data_type"),
                    nullable: row.get::<_, String>("is_nullable") == "YES",
                    default_value: row.get("column_default"),
                    primary_key: row.get("is_primary_key"),
                });
        }

        let tables: Vec<TableDef> = tables
            .into_iter()
            .map(|((schema, name), columns)| TableDef {
                schema,
                name,
                columns,
            })
            .collect();

        debug!("Introspected live schema with {} tables", tables.len());
        Ok(LiveSchema::new(tables))
    }

    async fn drop_schema(&self, schema: &str) -> MigrateResult<()> {
        let client = self.client().await?;
        client
            .batch_execute(&format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", schema))
            .await?;
        info!("Dropped schema {:?}", schema);
        Ok(())
    }
}
