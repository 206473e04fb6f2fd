//! Schema backend seam
//!
//! Everything the migration core needs from the live database: running
//! revision scripts, reading and writing the persisted current-revision
//! marker, and snapshotting the live schema. Production uses the Postgres
//! implementation in `db`; tests run against an in-memory mock.

use crate::error::MigrateResult;
use crate::revision::RevisionId;
use crate::schema::LiveSchema;
use async_trait::async_trait;

#[async_trait]
pub trait SchemaBackend: Send + Sync {
    /// The persisted current-revision marker, or `None` when no revision
    /// has ever been applied.
    async fn current_marker(&self) -> MigrateResult<Option<RevisionId>>;

    /// Move the marker. Called only as the last step of a successful
    /// individual apply (forward or reverse).
    async fn set_marker(&self, marker: Option<&RevisionId>) -> MigrateResult<()>;

    /// Execute one revision's forward or reverse script.
    async fn run_script(&self, sql: &str) -> MigrateResult<()>;

    /// Capture the live schema for diffing and fingerprinting.
    async fn snapshot(&self) -> MigrateResult<LiveSchema>;

    /// Content fingerprint of the live schema's observable state.
    async fn fingerprint(&self) -> MigrateResult<String> {
        Ok(self.snapshot().await?.checksum)
    }

    /// Destroy a named schema and everything in it. Irreversible.
    async fn drop_schema(&self, schema: &str) -> MigrateResult<()>;
}
