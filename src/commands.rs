//! Operator commands
//!
//! One function per CLI operation. Each command builds its collaborators,
//! runs synchronously to completion, and releases the connection on every
//! exit path by scope. Guarded no-ops report and exit successfully.

use crate::apply::{Applier, ApplyTarget};
use crate::author::{AuthorRevision, DiffAuthor};
use crate::backend::SchemaBackend;
use crate::branch::BranchContext;
use crate::config::Settings;
use crate::db::PgBackend;
use crate::drift::DriftDetector;
use crate::error::MigrateResult;
use crate::registry::ModelRegistry;
use crate::revision::RevisionStore;
use crate::squash::{delete_artifacts, SquashCoordinator, SquashOutcome};
use tracing::{info, warn};

/// Destroy a named schema and everything in it. Irreversible.
pub async fn drop(settings: &Settings, schema: &str) -> MigrateResult<()> {
    info!("Dropping database schema: {}", schema);
    let backend = PgBackend::connect(&settings.database).await?;
    backend.drop_schema(schema).await
}

/// Author a new revision when the models drifted from the live schema,
/// then apply forward to head.
pub async fn upgrade(settings: &Settings, message: Option<&str>) -> MigrateResult<()> {
    info!("Upgrading database");
    let backend = PgBackend::connect(&settings.database).await?;
    let store = RevisionStore::open(&settings.migration.migrations_dir)?;
    let registry = ModelRegistry::load_modules(&settings.migration)?;
    let ctx = BranchContext::detect();

    let detector = DriftDetector::new(&registry);
    if detector.has_pending_changes(&backend).await? {
        let author = DiffAuthor::new(&registry);
        author
            .author_if_changed(&backend, &store, &ctx, message)
            .await?;
    }

    let applied = Applier::new(&backend, &store)
        .upgrade(ApplyTarget::Head)
        .await?;
    info!("Applied {} revisions", applied);
    Ok(())
}

/// Apply forward to head without authoring, optionally scoped to a schema.
pub async fn migrate(settings: &Settings, schema: &str) -> MigrateResult<()> {
    info!("Running database migrations");
    let backend = PgBackend::connect(&settings.database)
        .await?
        .with_schema_scope(schema);
    let store = RevisionStore::open(&settings.migration.migrations_dir)?;

    let applied = Applier::new(&backend, &store)
        .upgrade(ApplyTarget::Head)
        .await?;
    info!("Applied {} revisions", applied);
    Ok(())
}

/// Reverse `levels` steps and delete the corresponding artifacts,
/// independent of branch ownership.
pub async fn downgrade(settings: &Settings, levels: usize) -> MigrateResult<()> {
    info!("Downgrading database {} levels", levels);
    let backend = PgBackend::connect(&settings.database).await?;
    let store = RevisionStore::open(&settings.migration.migrations_dir)?;

    let reversed = Applier::new(&backend, &store)
        .downgrade(ApplyTarget::Steps(levels))
        .await?;
    if reversed.is_empty() {
        info!("Nothing to downgrade");
        return Ok(());
    }

    let ids: Vec<_> = reversed.iter().map(|r| r.id).collect();
    let deleted = delete_artifacts(&store, &ids)?;
    info!("Reversed {} revisions, deleted {} artifacts", ids.len(), deleted);
    Ok(())
}

/// Squash the current branch's contiguous trailing revisions into at most
/// one equivalent revision.
pub async fn squash(settings: &Settings, force: bool) -> MigrateResult<()> {
    info!("Squashing database migrations");
    let backend = PgBackend::connect(&settings.database).await?;
    let store = RevisionStore::open(&settings.migration.migrations_dir)?;
    let registry = ModelRegistry::load_modules(&settings.migration)?;
    let ctx = BranchContext::detect();

    let author = DiffAuthor::new(&registry);
    let coordinator = SquashCoordinator::new(
        &backend,
        &store,
        &author,
        &settings.migration.protected_branches,
    );

    match coordinator.squash(&ctx, force).await? {
        SquashOutcome::SkippedProtected { branch } => {
            warn!(
                "Cannot squash migrations on protected branch {:?}. Use --force to override.",
                branch
            );
        }
        SquashOutcome::NothingToSquash => {
            info!("No migrations to squash");
        }
        SquashOutcome::Squashed {
            squashed,
            deleted_artifacts,
            authored,
        } => {
            info!(
                "Squashed {} revisions ({} artifacts deleted), regenerated: {}",
                squashed,
                deleted_artifacts,
                authored
                    .map(|id| id.short())
                    .unwrap_or_else(|| "none".to_string())
            );
        }
    }
    Ok(())
}

/// Report the current marker, the chain head, and whether the models have
/// drifted from the live schema.
pub async fn status(settings: &Settings) -> MigrateResult<()> {
    let backend = PgBackend::connect(&settings.database).await?;
    let store = RevisionStore::open(&settings.migration.migrations_dir)?;
    let registry = ModelRegistry::load_modules(&settings.migration)?;

    let chain = store.chain()?;
    let marker = backend.current_marker().await?;
    let pending = DriftDetector::new(&registry)
        .has_pending_changes(&backend)
        .await?;

    if chain.is_empty() {
        info!("No revisions authored yet");
    } else {
        info!("Chain length: {}", chain.len());
    }
    info!(
        "Head: {}",
        chain
            .head()
            .map(|h| format!("{} ({})", h.id.short(), h.label))
            .unwrap_or_else(|| "none".to_string())
    );
    info!(
        "Current revision marker: {}",
        marker
            .map(|id| id.short())
            .unwrap_or_else(|| "none".to_string())
    );
    info!("Pending model changes: {}", pending);
    Ok(())
}
