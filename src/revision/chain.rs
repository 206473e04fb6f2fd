//! Chain topology
//!
//! Validates and traverses the singly-linked revision chain. A snapshot is
//! taken from the store, the head is located, and the walk follows parent
//! pointers from head to root. Structural violations (no unique head,
//! dangling parent, cycle) surface as store corruption.

use crate::error::{corruption_error, MigrateError, MigrateResult};
use crate::revision::{Revision, RevisionId};
use std::collections::{HashMap, HashSet};

/// A point-in-time copy of every stored revision, keyed for traversal.
/// Later store mutations are not reflected; take a fresh snapshot instead.
#[derive(Debug)]
pub struct ChainSnapshot {
    revisions: HashMap<RevisionId, Revision>,
    head: Option<RevisionId>,
}

impl ChainSnapshot {
    /// Build a snapshot from raw revisions, validating head uniqueness:
    /// at most one revision may be without a child.
    pub fn from_revisions(revisions: Vec<Revision>) -> MigrateResult<Self> {
        let parents: HashSet<RevisionId> =
            revisions.iter().filter_map(|r| r.parent_id).collect();

        let heads: Vec<RevisionId> = revisions
            .iter()
            .filter(|r| !parents.contains(&r.id))
            .map(|r| r.id)
            .collect();

        let head = match heads.as_slice() {
            [] if revisions.is_empty() => None,
            [] => {
                // Non-empty but every revision has a child: the links loop.
                return Err(corruption_error(
                    "no head revision found; the parent chain forms a cycle",
                ));
            }
            [single] => Some(*single),
            many => {
                let mut ids: Vec<String> = many.iter().map(|id| id.short()).collect();
                ids.sort();
                return Err(corruption_error(format!(
                    "multiple head revisions found ({}); history has diverged",
                    ids.join(", ")
                )));
            }
        };

        let by_id: HashMap<RevisionId, Revision> =
            revisions.into_iter().map(|r| (r.id, r)).collect();

        Ok(Self {
            revisions: by_id,
            head,
        })
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn head(&self) -> Option<&Revision> {
        self.head.and_then(|id| self.revisions.get(&id))
    }

    pub fn get(&self, id: &RevisionId) -> Option<&Revision> {
        self.revisions.get(id)
    }

    /// Iterate the chain head-to-root. Yields an error item when a
    /// `parent_id` does not resolve to a stored revision or when the walk
    /// exceeds the number of stored revisions (a cycle).
    pub fn walk(&self) -> RevisionWalk<'_> {
        RevisionWalk {
            snapshot: self,
            next: self.head,
            previous: None,
            yielded: 0,
        }
    }

    /// The chain in apply order, root first. Fails on any corruption the
    /// walk encounters.
    pub fn ordered(&self) -> MigrateResult<Vec<&Revision>> {
        let mut revs: Vec<&Revision> = self.walk().collect::<MigrateResult<_>>()?;
        revs.reverse();
        Ok(revs)
    }

    /// Count contiguous trailing revisions authored by `tag`, walking from
    /// the head and stopping at the first mismatch. Matching ancestors
    /// beyond a mismatch never count.
    pub fn count_contiguous(&self, tag: &str) -> MigrateResult<usize> {
        let mut count = 0;
        for rev in self.walk() {
            let rev = rev?;
            if rev.branch_tag != tag {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

/// Head-to-root iterator over a chain snapshot.
pub struct RevisionWalk<'a> {
    snapshot: &'a ChainSnapshot,
    next: Option<RevisionId>,
    previous: Option<RevisionId>,
    yielded: usize,
}

impl<'a> Iterator for RevisionWalk<'a> {
    type Item = MigrateResult<&'a Revision>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;

        let Some(rev) = self.snapshot.get(&id) else {
            self.next = None;
            let referrer = self
                .previous
                .map(|p| p.short())
                .unwrap_or_else(|| "head".to_string());
            return Some(Err(MigrateError::StoreCorruption(format!(
                "revision {} references missing parent {}",
                referrer,
                id.short()
            ))));
        };

        if self.yielded >= self.snapshot.len() {
            self.next = None;
            return Some(Err(corruption_error(format!(
                "parent chain does not terminate after {} revisions; cycle detected",
                self.snapshot.len()
            ))));
        }

        self.previous = Some(rev.id);
        self.next = rev.parent_id;
        self.yielded += 1;
        Some(Ok(rev))
    }
}
