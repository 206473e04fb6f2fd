//! Revision store
//!
//! Persists one JSON artifact per revision in the migrations directory.
//! Artifact names carry a zero-padded sequence prefix so lexical sort order
//! matches chain order from root to head. Chain semantics, however, are
//! always derived from the parent links inside the artifacts; file order is
//! a layout invariant, not the source of truth.

use crate::error::{corruption_error, MigrateResult};
use crate::revision::chain::ChainSnapshot;
use crate::revision::{Revision, RevisionId};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const ARTIFACT_EXT: &str = "json";

/// Persisted, ordered collection of revision artifacts; the ground truth
/// for chain topology.
pub struct RevisionStore {
    dir: PathBuf,
}

impl RevisionStore {
    /// Open (creating if needed) the store at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> MigrateResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// List artifact paths in lexical (= chain) order, root first.
    fn artifact_paths(&self) -> MigrateResult<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXT))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Load every stored revision, in artifact order.
    pub fn load_all(&self) -> MigrateResult<Vec<Revision>> {
        let mut revisions = Vec::new();
        for path in self.artifact_paths()? {
            let raw = fs::read_to_string(&path)?;
            let revision: Revision = serde_json::from_str(&raw)?;
            revisions.push(revision);
        }
        Ok(revisions)
    }

    /// Take a validated point-in-time snapshot of the chain.
    pub fn chain(&self) -> MigrateResult<ChainSnapshot> {
        ChainSnapshot::from_revisions(self.load_all()?)
    }

    /// Walk the chain head-to-root. Each call re-reads the store; the
    /// result is a snapshot, never a cache.
    pub fn walk_from_head(&self) -> MigrateResult<Vec<Revision>> {
        let snapshot = self.chain()?;
        let walked: Vec<Revision> = snapshot
            .walk()
            .map(|r| r.map(Clone::clone))
            .collect::<MigrateResult<_>>()?;
        Ok(walked)
    }

    /// Count contiguous trailing revisions authored by `tag`.
    pub fn count_contiguous(&self, tag: &str) -> MigrateResult<usize> {
        self.chain()?.count_contiguous(tag)
    }

    /// Persist a newly authored revision. The revision must extend the
    /// current head; the artifact gets the next sequence number.
    pub fn save(&self, revision: &Revision) -> MigrateResult<PathBuf> {
        let chain = self.chain()?;
        let head_id = chain.head().map(|h| h.id);
        if revision.parent_id != head_id {
            return Err(corruption_error(format!(
                "revision {} is parented to {:?} but the chain head is {:?}",
                revision.id.short(),
                revision.parent_id.map(|id| id.short()),
                head_id.map(|id| id.short())
            )));
        }

        let seq = chain.len() + 1;
        let path = self
            .dir
            .join(format!("{:04}_{}.{}", seq, revision.id.short(), ARTIFACT_EXT));
        let encoded = serde_json::to_string_pretty(revision)?;
        fs::write(&path, encoded)?;

        info!(
            "Authored revision {} (branch: {:?}, label: {:?})",
            revision.id.short(),
            revision.branch_tag,
            revision.label
        );
        Ok(path)
    }

    /// Delete the artifact for `id`. Returns `false` when no artifact for
    /// that revision exists on disk (store drift); the caller decides how
    /// loudly to report it.
    pub fn delete(&self, id: &RevisionId) -> MigrateResult<bool> {
        let marker = format!("_{}.{}", id.short(), ARTIFACT_EXT);
        for path in self.artifact_paths()? {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(&marker))
                .unwrap_or(false);
            if matches {
                fs::remove_file(&path)?;
                debug!("Deleted revision artifact {}", path.display());
                return Ok(true);
            }
        }
        warn!(
            "Revision artifact for {} not found in {} (store drift)",
            id.short(),
            self.dir.display()
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::MigrationScript;
    use crate::error::MigrateError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn script(up: &str, down: &str) -> MigrationScript {
        MigrationScript {
            up_sql: up.to_string(),
            down_sql: down.to_string(),
        }
    }

    fn store_with_chain(tags: &[&str]) -> (TempDir, RevisionStore, Vec<Revision>) {
        let tmp = TempDir::new().unwrap();
        let store = RevisionStore::open(tmp.path()).unwrap();
        let mut revisions = Vec::new();
        for tag in tags {
            let parent = revisions.last().map(|r: &Revision| r.id);
            let rev = Revision::new(parent, *tag, *tag, script("-- up", "-- down"));
            store.save(&rev).unwrap();
            revisions.push(rev);
        }
        (tmp, store, revisions)
    }

    #[test]
    fn test_save_and_walk_roundtrip() {
        let (_tmp, store, revisions) = store_with_chain(&["main", "featA", "featA"]);

        let walked = store.walk_from_head().unwrap();
        assert_eq!(walked.len(), 3);
        assert_eq!(walked[0].id, revisions[2].id);
        assert_eq!(walked[2].id, revisions[0].id);
    }

    #[test]
    fn test_artifact_names_sort_in_chain_order() {
        let (_tmp, store, revisions) = store_with_chain(&["main", "featA"]);

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded[0].id, revisions[0].id);
        assert_eq!(loaded[1].id, revisions[1].id);
    }

    #[test]
    fn test_save_rejects_revision_not_extending_head() {
        let (_tmp, store, _revisions) = store_with_chain(&["main"]);

        // Parented to nothing while a head exists.
        let stray = Revision::new(None, "featA", "featA", script("", ""));
        assert!(matches!(
            store.save(&stray),
            Err(MigrateError::StoreCorruption(_))
        ));
    }

    #[test]
    fn test_delete_returns_false_on_missing_artifact() {
        let (_tmp, store, revisions) = store_with_chain(&["main"]);

        assert!(store.delete(&revisions[0].id).unwrap());
        // Second delete: artifact is gone, reported as drift, not an error.
        assert!(!store.delete(&revisions[0].id).unwrap());
    }

    #[test]
    fn test_walk_is_a_fresh_snapshot_each_call() {
        let (_tmp, store, revisions) = store_with_chain(&["main", "featA"]);

        assert_eq!(store.walk_from_head().unwrap().len(), 2);
        store.delete(&revisions[1].id).unwrap();
        assert_eq!(store.walk_from_head().unwrap().len(), 1);
    }

    #[test]
    fn test_count_contiguous_through_store() {
        let (_tmp, store, _revisions) = store_with_chain(&["main", "featA", "featA"]);
        assert_eq!(store.count_contiguous("featA").unwrap(), 2);
        assert_eq!(store.count_contiguous("main").unwrap(), 0);
    }
}
