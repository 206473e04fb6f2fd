//! Revision authoring
//!
//! Creates at most one new revision from the current diff between the
//! target models and the live schema. Used by `upgrade` (auto-author on
//! drift) and by the squash regenerate stage.

use crate::backend::SchemaBackend;
use crate::branch::BranchContext;
use crate::diff::DiffEngine;
use crate::error::MigrateResult;
use crate::registry::ModelRegistry;
use crate::revision::{Revision, RevisionStore};
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait AuthorRevision: Send + Sync {
    /// Compare live schema to target definitions; when they disagree,
    /// author exactly one new revision parented on the current head and
    /// tagged with the context branch. Returns `None` on no change.
    async fn author_if_changed(
        &self,
        backend: &dyn SchemaBackend,
        store: &RevisionStore,
        ctx: &BranchContext,
        message: Option<&str>,
    ) -> MigrateResult<Option<Revision>>;
}

/// Production author backed by the diff engine and the model registry.
pub struct DiffAuthor<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> DiffAuthor<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl AuthorRevision for DiffAuthor<'_> {
    async fn author_if_changed(
        &self,
        backend: &dyn SchemaBackend,
        store: &RevisionStore,
        ctx: &BranchContext,
        message: Option<&str>,
    ) -> MigrateResult<Option<Revision>> {
        let live = backend.snapshot().await?;
        let Some(planned) = DiffEngine::plan(self.registry.table_defs(), &live.tables) else {
            return Ok(None);
        };

        let head_id = store.chain()?.head().map(|h| h.id);
        let label = message.unwrap_or(ctx.branch()).to_string();
        let revision = Revision::new(head_id, ctx.branch(), label, planned.script);
        store.save(&revision)?;
        info!(
            "Authored revision {} on branch {:?}: {}",
            revision.id.short(),
            ctx.branch(),
            planned.description
        );
        Ok(Some(revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::schema::{ColumnDef, TableDef};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn registry_with(names: &[&str]) -> ModelRegistry {
        let mut builder = ModelRegistry::builder();
        for name in names {
            builder = builder
                .register(TableDef {
                    schema: "public".to_string(),
                    name: name.to_string(),
                    columns: vec![ColumnDef {
                        name: "id".to_string(),
                        data_type: "integer".to_string(),
                        nullable: false,
                        default_value: None,
                        primary_key: true,
                    }],
                })
                .unwrap();
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_authors_single_revision_on_drift() {
        let tmp = TempDir::new().unwrap();
        let store = RevisionStore::open(tmp.path()).unwrap();
        let registry = registry_with(&["users"]);
        let backend = MockBackend::new();

        let author = DiffAuthor::new(&registry);
        let ctx = BranchContext::from_branch("featA");
        let revision = author
            .author_if_changed(&backend, &store, &ctx, None)
            .await
            .unwrap()
            .expect("expected an authored revision");

        assert_eq!(revision.branch_tag, "featA");
        assert_eq!(revision.label, "featA");
        assert_eq!(revision.parent_id, None);
        assert!(revision.up_sql.contains("CREATE TABLE \"public\".\"users\""));
        assert_eq!(store.walk_from_head().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_message_overrides_label_but_not_branch_tag() {
        let tmp = TempDir::new().unwrap();
        let store = RevisionStore::open(tmp.path()).unwrap();
        let registry = registry_with(&["users"]);
        let backend = MockBackend::new();

        let author = DiffAuthor::new(&registry);
        let ctx = BranchContext::from_branch("featA");
        let revision = author
            .author_if_changed(&backend, &store, &ctx, Some("add users"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(revision.label, "add users");
        assert_eq!(revision.branch_tag, "featA");
    }

    #[tokio::test]
    async fn test_no_revision_when_schemas_agree() {
        let tmp = TempDir::new().unwrap();
        let store = RevisionStore::open(tmp.path()).unwrap();
        let registry = registry_with(&["users"]);
        let backend = MockBackend::with_tables(&["users"]);

        let author = DiffAuthor::new(&registry);
        let ctx = BranchContext::from_branch("featA");
        let revision = author
            .author_if_changed(&backend, &store, &ctx, None)
            .await
            .unwrap();

        assert!(revision.is_none());
        assert!(store.walk_from_head().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_degraded_branch_yields_empty_branch_tag() {
        let tmp = TempDir::new().unwrap();
        let store = RevisionStore::open(tmp.path()).unwrap();
        let registry = registry_with(&["users"]);
        let backend = MockBackend::new();

        let author = DiffAuthor::new(&registry);
        let ctx = BranchContext::from_branch("");
        let revision = author
            .author_if_changed(&backend, &store, &ctx, None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(revision.branch_tag, "");
    }
}
