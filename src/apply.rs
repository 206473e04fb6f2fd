//! Migration appliers
//!
//! Apply forward or reverse scripts one revision at a time, moving the
//! persisted current-revision marker after each individual success. A
//! script failure aborts the batch immediately: the marker stays at the
//! last revision that applied cleanly and no compensating action is taken.

use crate::backend::SchemaBackend;
use crate::error::{corruption_error, MigrateError, MigrateResult};
use crate::revision::{Revision, RevisionId, RevisionStore};
use tracing::{info, warn};

/// Where an apply batch should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyTarget {
    /// Up to the chain head (forward only meaningful).
    Head,
    /// A fixed number of steps.
    Steps(usize),
    /// Up to (forward: through; reverse: down to) an explicit revision.
    Revision(RevisionId),
}

pub struct Applier<'a> {
    backend: &'a dyn SchemaBackend,
    store: &'a RevisionStore,
}

impl<'a> Applier<'a> {
    pub fn new(backend: &'a dyn SchemaBackend, store: &'a RevisionStore) -> Self {
        Self { backend, store }
    }

    /// Apply forward scripts from the marker toward the target, in chain
    /// order. Returns the number of revisions applied.
    pub async fn upgrade(&self, target: ApplyTarget) -> MigrateResult<usize> {
        let chain = self.store.chain()?;
        let ordered = chain.ordered()?;
        let mut marker = self.backend.current_marker().await?;

        let start = match marker {
            None => 0,
            Some(id) => {
                let pos = ordered.iter().position(|r| r.id == id).ok_or_else(|| {
                    corruption_error(format!(
                        "current revision marker {} does not exist in the chain",
                        id.short()
                    ))
                })?;
                pos + 1
            }
        };

        let pending = &ordered[start..];
        let count = match target {
            ApplyTarget::Head => pending.len(),
            ApplyTarget::Steps(n) => n.min(pending.len()),
            ApplyTarget::Revision(id) => {
                match pending.iter().position(|r| r.id == id) {
                    Some(pos) => pos + 1,
                    // Already at or behind the marker: nothing to do.
                    None if ordered[..start].iter().any(|r| r.id == id) => 0,
                    None => {
                        return Err(MigrateError::NotFound(format!(
                            "revision {} not found in the chain",
                            id.short()
                        )))
                    }
                }
            }
        };

        for revision in &pending[..count] {
            self.run_step(revision, &revision.up_sql, marker).await?;
            self.backend.set_marker(Some(&revision.id)).await?;
            marker = Some(revision.id);
            info!("Applied revision {} ({})", revision.id.short(), revision.label);
        }

        Ok(count)
    }

    /// Apply reverse scripts from the marker back toward the target.
    /// Returns the reversed revisions, most recent first, so callers can
    /// delete the matching artifacts.
    pub async fn downgrade(&self, target: ApplyTarget) -> MigrateResult<Vec<Revision>> {
        let chain = self.store.chain()?;
        let descending: Vec<&Revision> = chain.walk().collect::<MigrateResult<_>>()?;
        let mut marker = self.backend.current_marker().await?;

        let Some(marker_id) = marker else {
            // Nothing has been applied; nothing to reverse.
            return Ok(Vec::new());
        };

        let marker_pos = descending
            .iter()
            .position(|r| r.id == marker_id)
            .ok_or_else(|| {
                corruption_error(format!(
                    "current revision marker {} does not exist in the chain",
                    marker_id.short()
                ))
            })?;

        // Revisions currently applied, newest first.
        let applied = &descending[marker_pos..];
        let count = match target {
            ApplyTarget::Head => 0,
            ApplyTarget::Steps(n) => {
                if n > applied.len() {
                    warn!(
                        "Requested {} downgrade steps but only {} revisions are applied; \
                         stopping at the root",
                        n,
                        applied.len()
                    );
                }
                n.min(applied.len())
            }
            ApplyTarget::Revision(id) => applied
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| {
                    MigrateError::NotFound(format!(
                        "revision {} is not an applied ancestor of the marker",
                        id.short()
                    ))
                })?,
        };

        let mut reversed = Vec::with_capacity(count);
        for revision in &applied[..count] {
            self.run_step(revision, &revision.down_sql, marker).await?;
            self.backend.set_marker(revision.parent_id.as_ref()).await?;
            marker = revision.parent_id;
            info!("Reversed revision {} ({})", revision.id.short(), revision.label);
            reversed.push((*revision).clone());
        }

        Ok(reversed)
    }

    async fn run_step(
        &self,
        revision: &Revision,
        sql: &str,
        last_good: Option<RevisionId>,
    ) -> MigrateResult<()> {
        self.backend
            .run_script(sql)
            .await
            .map_err(|e| MigrateError::Apply {
                failing: revision.id,
                last_good,
                reason: e.to_string(),
            })
    }
}
