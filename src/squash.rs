//! Squash coordinator
//!
//! Compacts the contiguous run of head revisions authored by the current
//! branch into at most one equivalent revision:
//! count -> downgrade -> delete -> regenerate -> upgrade.
//!
//! There is no automatic rollback: a failure mid-squash leaves the schema
//! at the marker of the last completed step and reports the stage reached.
//! Operators must serialize migration commands externally; concurrent
//! invocations are unsupported.

use crate::apply::{Applier, ApplyTarget};
use crate::author::AuthorRevision;
use crate::backend::SchemaBackend;
use crate::branch::BranchContext;
use crate::error::{MigrateError, MigrateResult};
use crate::revision::{RevisionId, RevisionStore};
use std::fmt;
use tracing::{info, warn};

/// The stage a squash run is in; carried by failures so the operator knows
/// how far the run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquashStage {
    CountingBranch,
    Downgrading,
    DeletingArtifacts,
    Regenerating,
    Upgrading,
}

impl fmt::Display for SquashStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SquashStage::CountingBranch => "counting branch revisions",
            SquashStage::Downgrading => "downgrading",
            SquashStage::DeletingArtifacts => "deleting artifacts",
            SquashStage::Regenerating => "regenerating",
            SquashStage::Upgrading => "upgrading",
        };
        f.write_str(name)
    }
}

/// How a squash run ended. Guarded no-ops are reported outcomes, never
/// errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquashOutcome {
    /// Protected branch without --force: nothing was changed.
    SkippedProtected { branch: String },
    /// The head is not owned by the branch: nothing to squash.
    NothingToSquash,
    Squashed {
        /// Revisions removed from the chain.
        squashed: usize,
        /// Artifacts actually deleted; may be lower than `squashed` when
        /// the store had drifted.
        deleted_artifacts: usize,
        /// The replacement revision, when the regenerated diff was
        /// non-empty.
        authored: Option<RevisionId>,
    },
}

pub struct SquashCoordinator<'a> {
    backend: &'a dyn SchemaBackend,
    store: &'a RevisionStore,
    author: &'a dyn AuthorRevision,
    protected: &'a [String],
}

impl<'a> SquashCoordinator<'a> {
    pub fn new(
        backend: &'a dyn SchemaBackend,
        store: &'a RevisionStore,
        author: &'a dyn AuthorRevision,
        protected: &'a [String],
    ) -> Self {
        Self {
            backend,
            store,
            author,
            protected,
        }
    }

    pub async fn squash(&self, ctx: &BranchContext, force: bool) -> MigrateResult<SquashOutcome> {
        let tag = ctx.branch();

        if ctx.is_protected(self.protected) && !force {
            info!(
                "Refusing to squash on protected branch {:?} (use --force to override)",
                tag
            );
            return Ok(SquashOutcome::SkippedProtected {
                branch: tag.to_string(),
            });
        }

        // Stage 1: count the contiguous branch-owned run at the head and
        // pin the exact revision ids to remove, most recent first.
        let to_remove = self
            .branch_run(tag)
            .map_err(stage(SquashStage::CountingBranch))?;
        let n = to_remove.len();
        if n == 0 {
            info!("No revisions to squash for branch {:?}", tag);
            return Ok(SquashOutcome::NothingToSquash);
        }
        info!("Squashing {} revisions on branch {:?}", n, tag);

        let applier = Applier::new(self.backend, self.store);

        // Stage 2: reverse the live schema across the run. The marker
        // regresses one revision at a time; a mid-batch failure halts here
        // with the schema consistent at the partial marker.
        applier
            .downgrade(ApplyTarget::Steps(n))
            .await
            .map_err(stage(SquashStage::Downgrading))?;

        // Stage 3: delete exactly those artifacts, only now that the
        // corresponding reverse scripts have succeeded.
        let deleted = delete_artifacts(self.store, &to_remove)
            .map_err(stage(SquashStage::DeletingArtifacts))?;

        // Stage 4: regenerate at most one revision from the fresh diff.
        let authored = self
            .author
            .author_if_changed(self.backend, self.store, ctx, None)
            .await
            .map_err(stage(SquashStage::Regenerating))?;

        // Stage 5: bring the live schema back to the (new) head.
        applier
            .upgrade(ApplyTarget::Head)
            .await
            .map_err(stage(SquashStage::Upgrading))?;

        Ok(SquashOutcome::Squashed {
            squashed: n,
            deleted_artifacts: deleted,
            authored: authored.map(|r| r.id),
        })
    }

    /// The contiguous head run owned by `tag`, most recent first, with
    /// ownership re-verified on every member.
    fn branch_run(&self, tag: &str) -> MigrateResult<Vec<RevisionId>> {
        let mut run = Vec::new();
        for revision in self.store.walk_from_head()? {
            if revision.branch_tag != tag {
                break;
            }
            run.push(revision.id);
        }
        Ok(run)
    }
}

/// Delete the artifacts for `ids` in the given order. Missing artifacts
/// (store drift) are logged and skipped rather than failing the run;
/// returns the number actually deleted.
pub fn delete_artifacts(store: &RevisionStore, ids: &[RevisionId]) -> MigrateResult<usize> {
    let mut deleted = 0;
    for id in ids {
        if store.delete(id)? {
            deleted += 1;
        }
    }
    if deleted < ids.len() {
        warn!(
            "Expected to delete {} revision artifacts but only {} were found",
            ids.len(),
            deleted
        );
    }
    Ok(deleted)
}

fn stage(stage: SquashStage) -> impl FnOnce(MigrateError) -> MigrateError {
    move |source| MigrateError::SquashFailed {
        stage,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::diff::MigrationScript;
    use crate::revision::Revision;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Test author that replays a fixed script instead of diffing.
    struct ScriptedAuthor {
        script: Option<MigrationScript>,
    }

    #[async_trait]
    impl AuthorRevision for ScriptedAuthor {
        async fn author_if_changed(
            &self,
            _backend: &dyn SchemaBackend,
            store: &RevisionStore,
            ctx: &BranchContext,
            message: Option<&str>,
        ) -> MigrateResult<Option<Revision>> {
            let Some(script) = self.script.clone() else {
                return Ok(None);
            };
            let head_id = store.chain()?.head().map(|h| h.id);
            let label = message.unwrap_or(ctx.branch());
            let revision = Revision::new(head_id, ctx.branch(), label, script);
            store.save(&revision)?;
            Ok(Some(revision))
        }
    }

    fn script(up: &str, down: &str) -> MigrationScript {
        MigrationScript {
            up_sql: up.to_string(),
            down_sql: down.to_string(),
        }
    }

    fn protected() -> Vec<String> {
        vec!["main".to_string(), "master".to_string()]
    }

    /// R1(main: +users) -> R2(featA: +posts) -> R3(featA: +comments)
    async fn seeded() -> (TempDir, RevisionStore, MockBackend, Vec<Revision>) {
        let tmp = TempDir::new().unwrap();
        let store = RevisionStore::open(tmp.path()).unwrap();
        let specs = [
            ("main", "users"),
            ("featA", "posts"),
            ("featA", "comments"),
        ];
        let mut revisions: Vec<Revision> = Vec::new();
        for (tag, table) in specs {
            let parent = revisions.last().map(|r| r.id);
            let rev = Revision::new(
                parent,
                tag,
                table,
                script(&format!("+{}", table), &format!("-{}", table)),
            );
            store.save(&rev).unwrap();
            revisions.push(rev);
        }

        let backend = MockBackend::new();
        Applier::new(&backend, &store)
            .upgrade(ApplyTarget::Head)
            .await
            .unwrap();
        (tmp, store, backend, revisions)
    }

    #[tokio::test]
    async fn test_protected_branch_is_reported_noop() {
        let (_tmp, store, backend, _revisions) = seeded().await;
        let author = ScriptedAuthor { script: None };
        let protected = protected();
        let coordinator = SquashCoordinator::new(&backend, &store, &author, &protected);

        let before = backend.fingerprint().await.unwrap();
        let outcome = coordinator
            .squash(&BranchContext::from_branch("main"), false)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SquashOutcome::SkippedProtected {
                branch: "main".to_string()
            }
        );
        assert_eq!(store.walk_from_head().unwrap().len(), 3);
        assert_eq!(backend.fingerprint().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_protected_branch_with_force_proceeds() {
        let tmp = TempDir::new().unwrap();
        let store = RevisionStore::open(tmp.path()).unwrap();
        let rev = Revision::new(None, "main", "users", script("+users", "-users"));
        store.save(&rev).unwrap();
        let backend = MockBackend::new();
        Applier::new(&backend, &store)
            .upgrade(ApplyTarget::Head)
            .await
            .unwrap();

        let author = ScriptedAuthor {
            script: Some(script("+users", "-users")),
        };
        let protected = protected();
        let coordinator = SquashCoordinator::new(&backend, &store, &author, &protected);

        let outcome = coordinator
            .squash(&BranchContext::from_branch("main"), true)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SquashOutcome::Squashed { squashed: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_nothing_to_squash_when_head_not_owned() {
        let (_tmp, store, backend, _revisions) = seeded().await;
        let author = ScriptedAuthor { script: None };
        let protected = protected();
        let coordinator = SquashCoordinator::new(&backend, &store, &author, &protected);

        let outcome = coordinator
            .squash(&BranchContext::from_branch("featB"), false)
            .await
            .unwrap();
        assert_eq!(outcome, SquashOutcome::NothingToSquash);
        assert_eq!(store.walk_from_head().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_squash_roundtrip_preserves_schema_fingerprint() {
        let (_tmp, store, backend, revisions) = seeded().await;
        // The regenerated revision reproduces the branch's net effect.
        let author = ScriptedAuthor {
            script: Some(script("+posts\n+comments", "-comments\n-posts")),
        };
        let protected = protected();
        let coordinator = SquashCoordinator::new(&backend, &store, &author, &protected);

        let before = backend.fingerprint().await.unwrap();
        let outcome = coordinator
            .squash(&BranchContext::from_branch("featA"), false)
            .await
            .unwrap();

        let SquashOutcome::Squashed {
            squashed,
            deleted_artifacts,
            authored,
        } = outcome
        else {
            panic!("expected a completed squash, got {outcome:?}");
        };
        assert_eq!(squashed, 2);
        assert_eq!(deleted_artifacts, 2);
        let new_head = authored.expect("expected a regenerated revision");

        // Chain is now R1 -> R4(featA), and R4 replaces the squashed run.
        let walked = store.walk_from_head().unwrap();
        assert_eq!(walked.len(), 2);
        assert_eq!(walked[0].id, new_head);
        assert_eq!(walked[0].branch_tag, "featA");
        assert_eq!(walked[0].parent_id, Some(revisions[0].id));
        assert_eq!(walked[1].id, revisions[0].id);

        // Live schema is observably unchanged and the marker is at the
        // new head.
        assert_eq!(backend.fingerprint().await.unwrap(), before);
        assert_eq!(backend.current_marker().await.unwrap(), Some(new_head));
    }

    #[tokio::test]
    async fn test_squash_with_no_change_diff_authors_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = RevisionStore::open(tmp.path()).unwrap();
        let root = Revision::new(None, "main", "users", script("+users", "-users"));
        store.save(&root).unwrap();
        // A branch revision whose net effect the models never adopted.
        let scratch = Revision::new(
            Some(root.id),
            "featA",
            "scratch",
            script("+scratch", "-scratch"),
        );
        store.save(&scratch).unwrap();

        let backend = MockBackend::new();
        Applier::new(&backend, &store)
            .upgrade(ApplyTarget::Head)
            .await
            .unwrap();

        let author = ScriptedAuthor { script: None };
        let protected = protected();
        let coordinator = SquashCoordinator::new(&backend, &store, &author, &protected);

        let outcome = coordinator
            .squash(&BranchContext::from_branch("featA"), false)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SquashOutcome::Squashed {
                squashed: 1,
                deleted_artifacts: 1,
                authored: None,
            }
        );

        // Chain shrank to the root and the schema matches the root's state.
        let walked = store.walk_from_head().unwrap();
        assert_eq!(walked.len(), 1);
        assert_eq!(walked[0].id, root.id);
        assert_eq!(backend.table_names(), vec!["users"]);
        assert_eq!(backend.current_marker().await.unwrap(), Some(root.id));
    }

    #[tokio::test]
    async fn test_downgrade_failure_reports_stage_without_rollback() {
        let tmp = TempDir::new().unwrap();
        let store = RevisionStore::open(tmp.path()).unwrap();
        let root = Revision::new(None, "main", "users", script("+users", "-users"));
        store.save(&root).unwrap();
        let good = Revision::new(Some(root.id), "featA", "posts", script("+posts", "-posts"));
        store.save(&good).unwrap();
        // Reverse script of the head revision fails.
        let bad = Revision::new(Some(good.id), "featA", "bad", script("+tmp", "!down broken"));
        store.save(&bad).unwrap();

        let backend = MockBackend::new();
        Applier::new(&backend, &store)
            .upgrade(ApplyTarget::Head)
            .await
            .unwrap();

        let author = ScriptedAuthor { script: None };
        let protected = protected();
        let coordinator = SquashCoordinator::new(&backend, &store, &author, &protected);

        let err = coordinator
            .squash(&BranchContext::from_branch("featA"), false)
            .await
            .unwrap_err();
        match err {
            MigrateError::SquashFailed { stage, .. } => {
                assert_eq!(stage, SquashStage::Downgrading);
            }
            other => panic!("expected squash failure, got {other:?}"),
        }

        // No artifacts were deleted and the marker still points at the
        // revision whose reverse failed.
        assert_eq!(store.walk_from_head().unwrap().len(), 3);
        assert_eq!(backend.current_marker().await.unwrap(), Some(bad.id));
    }

    #[tokio::test]
    async fn test_delete_artifacts_truncates_on_store_drift() {
        let (_tmp, store, _backend, revisions) = seeded().await;

        // The store reports 3 to delete, but one artifact vanished.
        store.delete(&revisions[1].id).unwrap();
        let ids: Vec<RevisionId> = revisions.iter().rev().map(|r| r.id).collect();

        let deleted = delete_artifacts(&store, &ids).unwrap();
        assert_eq!(deleted, 2);
    }
}
